use std::collections::HashMap;
use std::io;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use parking_lot::RwLock;

use crate::FileSystem;

#[cfg(not(target_os = "windows"))]
fn root_dir() -> PathBuf {
  PathBuf::from("/")
}

#[cfg(target_os = "windows")]
fn root_dir() -> PathBuf {
  PathBuf::from("C:/")
}

/// In memory implementation of a file-system entry
#[derive(Debug)]
enum InMemoryFileSystemEntry {
  File { contents: String },
  Directory,
}

/// In memory implementation of the `FileSystem` trait.
///
/// Writing a file implicitly creates all of its ancestor directories.
#[derive(Debug)]
pub struct InMemoryFileSystem {
  files: RwLock<HashMap<PathBuf, InMemoryFileSystemEntry>>,
  current_working_directory: RwLock<PathBuf>,
}

impl Default for InMemoryFileSystem {
  fn default() -> Self {
    Self {
      files: Default::default(),
      current_working_directory: RwLock::new(root_dir()),
    }
  }
}

impl InMemoryFileSystem {
  /// Change the current working directory. Used for resolving relative paths.
  pub fn set_current_working_directory(&self, cwd: &Path) {
    let cwd = canonicalize_impl(&self.current_working_directory, cwd);
    let mut state = self.current_working_directory.write();
    *state = cwd;
  }

  pub fn write_file(&self, path: &Path, contents: impl Into<String>) {
    let path = canonicalize_impl(&self.current_working_directory, path);
    let mut files = self.files.write();

    let mut dir = path.parent();
    while let Some(ancestor) = dir {
      files
        .entry(ancestor.to_path_buf())
        .or_insert(InMemoryFileSystemEntry::Directory);
      dir = ancestor.parent();
    }

    files.insert(
      path,
      InMemoryFileSystemEntry::File {
        contents: contents.into(),
      },
    );
  }

  pub fn remove_file(&self, path: &Path) {
    let path = canonicalize_impl(&self.current_working_directory, path);
    self.files.write().remove(&path);
  }
}

impl FileSystem for InMemoryFileSystem {
  fn cwd(&self) -> io::Result<PathBuf> {
    Ok(self.current_working_directory.read().clone())
  }

  fn read_to_string(&self, path: &Path) -> io::Result<String> {
    let path = canonicalize_impl(&self.current_working_directory, path);
    let files = self.files.read();
    match files.get(&path) {
      None => Err(io::Error::new(io::ErrorKind::NotFound, "File not found")),
      Some(InMemoryFileSystemEntry::File { contents }) => Ok(contents.clone()),
      Some(InMemoryFileSystemEntry::Directory) => Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        "Path is a directory",
      )),
    }
  }

  fn is_file(&self, path: &Path) -> bool {
    let path = canonicalize_impl(&self.current_working_directory, path);
    let files = self.files.read();
    matches!(files.get(&path), Some(InMemoryFileSystemEntry::File { .. }))
  }

  fn is_dir(&self, path: &Path) -> bool {
    let path = canonicalize_impl(&self.current_working_directory, path);
    let files = self.files.read();
    matches!(files.get(&path), Some(InMemoryFileSystemEntry::Directory))
  }
}

fn canonicalize_impl(current_working_directory: &RwLock<PathBuf>, path: &Path) -> PathBuf {
  let cwd = current_working_directory.read();
  let mut result = if path.is_absolute() {
    vec![]
  } else {
    cwd.components().collect()
  };

  for component in path.components() {
    match component {
      Component::Prefix(prefix) => {
        result = vec![Component::Prefix(prefix)];
      }
      Component::RootDir => {
        result.push(Component::RootDir);
      }
      Component::CurDir => {}
      Component::ParentDir => {
        result.pop();
      }
      Component::Normal(path) => {
        result.push(Component::Normal(path));
      }
    }
  }

  PathBuf::from_iter(result)
}
