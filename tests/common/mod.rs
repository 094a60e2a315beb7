// In-memory stand-ins for the remote store and the database.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::Path;

use panpost::config::WordPressConfig;
use panpost::publish::{NewPost, PostBackend, StoreError, WordPressStore};
use panpost::storage::{RemoteFile, RemoteStorage, StorageError};

pub const NOW: i64 = 1_760_000_000;

/// A document entry under the watched folder, created `age` seconds before NOW.
pub fn remote_doc(name: &str, age: i64) -> RemoteFile {
    RemoteFile {
        fs_id: name.len() as u64 * 1000 + age.unsigned_abs(),
        name: name.to_string(),
        path: format!("/apps/bypy/inbox/{name}"),
        is_directory: false,
        creation_timestamp: NOW - age,
        size: 0,
    }
}

pub fn remote_dir(name: &str, age: i64) -> RemoteFile {
    RemoteFile {
        is_directory: true,
        ..remote_doc(name, age)
    }
}

#[derive(Default)]
pub struct FakeStorage {
    pub files: RefCell<Vec<(RemoteFile, Vec<u8>)>>,
    pub fail_list: Cell<bool>,
    pub fail_delete: Cell<bool>,
    /// Names whose download errors out
    pub fail_download: RefCell<HashSet<String>>,
    /// Names whose download reports success but writes nothing
    pub hollow_download: RefCell<HashSet<String>>,
    /// Listing fails with an expired-token errno until renewed
    pub token_expired: Cell<bool>,
    /// Renewal reports success but the token stays rejected
    pub stuck_token: Cell<bool>,
    pub renewals: Cell<usize>,
    pub list_calls: Cell<usize>,
    pub downloaded: RefCell<Vec<String>>,
    pub deleted: RefCell<Vec<String>>,
}

impl FakeStorage {
    pub fn with_files(files: Vec<(RemoteFile, &str)>) -> Self {
        let storage = Self::default();
        *storage.files.borrow_mut() = files
            .into_iter()
            .map(|(f, content)| (f, content.as_bytes().to_vec()))
            .collect();
        storage
    }

    pub fn remaining_paths(&self) -> Vec<String> {
        self.files.borrow().iter().map(|(f, _)| f.path.clone()).collect()
    }
}

impl RemoteStorage for FakeStorage {
    fn list(&self, _folder: &str, _recursive: bool) -> Result<Vec<RemoteFile>, StorageError> {
        self.list_calls.set(self.list_calls.get() + 1);
        if self.fail_list.get() {
            return Err(StorageError::Api {
                endpoint: "listall".to_string(),
                errno: -7,
            });
        }
        if self.token_expired.get() {
            return Err(StorageError::Api {
                endpoint: "listall".to_string(),
                errno: 111,
            });
        }
        Ok(self.files.borrow().iter().map(|(f, _)| f.clone()).collect())
    }

    fn download(&self, file: &RemoteFile, dest: &Path) -> Result<(), StorageError> {
        self.downloaded.borrow_mut().push(file.name.clone());
        if self.fail_download.borrow().contains(&file.name) {
            return Err(StorageError::Api {
                endpoint: "filemetas".to_string(),
                errno: 31066,
            });
        }
        if self.hollow_download.borrow().contains(&file.name) {
            return Ok(());
        }
        let files = self.files.borrow();
        let (_, content) = files
            .iter()
            .find(|(f, _)| f.path == file.path)
            .ok_or_else(|| StorageError::Malformed {
                endpoint: "download".to_string(),
                detail: format!("{} not found", file.path),
            })?;
        std::fs::write(dest, content)?;
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.deleted.borrow_mut().push(path.to_string());
        if self.fail_delete.get() {
            return Err(StorageError::Api {
                endpoint: "filemanager".to_string(),
                errno: -9,
            });
        }
        self.files.borrow_mut().retain(|(f, _)| f.path != path);
        Ok(())
    }

    fn renew_token(&self) -> Result<bool, StorageError> {
        self.renewals.set(self.renewals.get() + 1);
        if !self.stuck_token.get() {
            self.token_expired.set(false);
        }
        Ok(true)
    }
}

#[derive(Default)]
pub struct FakeBackend {
    pub rows: Vec<NewPost>,
    pending: Vec<NewPost>,
    pub tables: Vec<String>,
    /// Every call fails, as if the server were unreachable
    pub unreachable: bool,
    pub fail_insert: bool,
    pub calls: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub ddl_runs: usize,
}

impl FakeBackend {
    fn call(&mut self) -> Result<(), StoreError> {
        self.calls += 1;
        if self.unreachable {
            return Err(StoreError::Backend("connection refused".to_string()));
        }
        Ok(())
    }

    pub fn titles(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.title.as_str()).collect()
    }
}

impl PostBackend for FakeBackend {
    fn begin(&mut self) -> Result<(), StoreError> {
        self.call()
    }

    fn count_titles(&mut self, _table: &str, title: &str) -> Result<u64, StoreError> {
        self.call()?;
        Ok(self.rows.iter().filter(|r| r.title == title).count() as u64)
    }

    fn insert_post(&mut self, _table: &str, post: &NewPost) -> Result<(), StoreError> {
        self.call()?;
        if self.fail_insert {
            return Err(StoreError::Backend("insert rejected".to_string()));
        }
        self.pending.push(post.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.call()?;
        self.commits += 1;
        self.rows.append(&mut self.pending);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.rollbacks += 1;
        self.pending.clear();
        self.call()
    }

    fn table_exists(&mut self, table: &str) -> Result<bool, StoreError> {
        self.call()?;
        Ok(self.tables.iter().any(|t| t == table))
    }

    fn create_posts_table(&mut self, table: &str) -> Result<(), StoreError> {
        self.call()?;
        self.ddl_runs += 1;
        self.tables.push(table.to_string());
        Ok(())
    }
}

pub fn wordpress_config() -> WordPressConfig {
    WordPressConfig::new(
        "127.0.0.1".to_string(),
        "wp".to_string(),
        "secret".to_string(),
        "wordpress".to_string(),
    )
}

pub fn fake_store() -> WordPressStore<FakeBackend> {
    WordPressStore::new(FakeBackend::default(), &wordpress_config()).unwrap()
}
