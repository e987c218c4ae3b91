use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tagcss_filesystem::FileSystemRef;

use crate::error::ResolveError;

pub const DEFAULT_EXTENSIONS: &[&str] = &[".js", ".jsx", ".ts", ".tsx", ".mjs", ".cjs", ".json"];

/// Maps a `require` specifier to an absolute file path.
#[mockall::automock]
pub trait ModuleResolver: std::fmt::Debug {
  fn resolve(&self, specifier: &str, from_dir: &Path) -> Result<PathBuf, ResolveError>;
}

pub type ModuleResolverRef = Arc<dyn ModuleResolver + Send + Sync>;

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
  main: Option<String>,
}

/// Node style resolution over a [`tagcss_filesystem::FileSystem`]: relative and
/// absolute paths, implicit extensions, directory `index` files,
/// `package.json` `main` and `node_modules` lookup through every ancestor.
#[derive(Debug)]
pub struct NodeResolver {
  fs: FileSystemRef,
  extensions: Vec<String>,
}

impl NodeResolver {
  pub fn new(fs: FileSystemRef) -> Self {
    let extensions = DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect();
    Self::with_extensions(fs, extensions)
  }

  pub fn with_extensions(fs: FileSystemRef, extensions: Vec<String>) -> Self {
    NodeResolver { fs, extensions }
  }

  fn resolve_file(&self, path: &Path) -> Option<PathBuf> {
    if self.fs.is_file(path) {
      return Some(path.to_path_buf());
    }

    self.extensions.iter().find_map(|extension| {
      let mut candidate = path.as_os_str().to_owned();
      candidate.push(extension);
      let candidate = PathBuf::from(candidate);
      self.fs.is_file(&candidate).then_some(candidate)
    })
  }

  fn resolve_directory(&self, dir: &Path) -> Result<Option<PathBuf>, ResolveError> {
    if !self.fs.is_dir(dir) {
      return Ok(None);
    }

    let package_path = dir.join("package.json");
    if self.fs.is_file(&package_path) {
      let package = self.read_package_json(&package_path)?;
      if let Some(main) = package.main {
        let main = normalize_path(&dir.join(main));
        if let Some(resolved) = self.resolve_file(&main) {
          return Ok(Some(resolved));
        }
        if let Some(resolved) = self.resolve_index(&main) {
          return Ok(Some(resolved));
        }
      }
    }

    Ok(self.resolve_index(dir))
  }

  fn resolve_index(&self, dir: &Path) -> Option<PathBuf> {
    self.resolve_file(&dir.join("index"))
  }

  fn read_package_json(&self, path: &Path) -> Result<PackageJson, ResolveError> {
    let invalid = |message: String| ResolveError::InvalidPackageJson {
      path: path.to_path_buf(),
      message,
    };
    let contents = self
      .fs
      .read_to_string(path)
      .map_err(|error| invalid(error.to_string()))?;
    serde_json::from_str(&contents).map_err(|error| invalid(error.to_string()))
  }

  fn resolve_path(&self, path: &Path) -> Result<Option<PathBuf>, ResolveError> {
    if let Some(resolved) = self.resolve_file(path) {
      return Ok(Some(resolved));
    }
    self.resolve_directory(path)
  }

  fn resolve_package(&self, specifier: &str, from_dir: &Path) -> Result<Option<PathBuf>, ResolveError> {
    for dir in from_dir.ancestors() {
      if dir.file_name().is_some_and(|name| name == "node_modules") {
        continue;
      }
      let candidate = dir.join("node_modules").join(specifier);
      if let Some(resolved) = self.resolve_path(&candidate)? {
        return Ok(Some(resolved));
      }
    }
    Ok(None)
  }
}

impl ModuleResolver for NodeResolver {
  fn resolve(&self, specifier: &str, from_dir: &Path) -> Result<PathBuf, ResolveError> {
    let is_path = specifier.starts_with("./")
      || specifier.starts_with("../")
      || specifier == "."
      || specifier == ".."
      || Path::new(specifier).is_absolute();

    let resolved = if is_path {
      self.resolve_path(&normalize_path(&from_dir.join(specifier)))?
    } else {
      self.resolve_package(specifier, from_dir)?
    };

    tracing::trace!(specifier, from = %from_dir.display(), ?resolved, "Resolved module");
    resolved.ok_or_else(|| ResolveError::NotFound {
      specifier: specifier.to_string(),
      from: from_dir.to_path_buf(),
    })
  }
}

/// Removes `.` and `..` components without touching the file system.
pub fn normalize_path(path: &Path) -> PathBuf {
  let mut normalized = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        normalized.pop();
      }
      component => normalized.push(component),
    }
  }
  normalized
}

#[cfg(test)]
mod tests {
  use tagcss_filesystem::InMemoryFileSystem;
  use tagcss_filesystem::MockFileSystem;

  use super::*;

  fn resolver(files: &[(&str, &str)]) -> NodeResolver {
    let fs = InMemoryFileSystem::default();
    for (path, contents) in files {
      fs.write_file(Path::new(path), *contents);
    }
    NodeResolver::new(Arc::new(fs))
  }

  #[test]
  fn test_normalize_path() {
    assert_eq!(
      normalize_path(Path::new("/app/src/../lib/./a.js")),
      PathBuf::from("/app/lib/a.js")
    );
  }

  #[test]
  fn test_resolves_relative_paths_with_extensions() {
    let resolver = resolver(&[("/app/src/colors.ts", ""), ("/app/src/theme/index.js", "")]);

    assert_eq!(
      resolver.resolve("./colors", Path::new("/app/src")),
      Ok(PathBuf::from("/app/src/colors.ts"))
    );
    assert_eq!(
      resolver.resolve("../src/theme", Path::new("/app/src")),
      Ok(PathBuf::from("/app/src/theme/index.js"))
    );
    assert_eq!(
      resolver.resolve("/app/src/colors.ts", Path::new("/")),
      Ok(PathBuf::from("/app/src/colors.ts"))
    );
  }

  #[test]
  fn test_resolves_packages_through_ancestors() {
    let resolver = resolver(&[
      ("/app/node_modules/tokens/package.json", r#"{ "main": "dist/tokens.js" }"#),
      ("/app/node_modules/tokens/dist/tokens.js", ""),
      ("/app/node_modules/plain/index.js", ""),
      ("/app/node_modules/plain/extra.js", ""),
    ]);

    assert_eq!(
      resolver.resolve("tokens", Path::new("/app/src/components")),
      Ok(PathBuf::from("/app/node_modules/tokens/dist/tokens.js"))
    );
    assert_eq!(
      resolver.resolve("plain", Path::new("/app/src")),
      Ok(PathBuf::from("/app/node_modules/plain/index.js"))
    );
    assert_eq!(
      resolver.resolve("plain/extra", Path::new("/app/src")),
      Ok(PathBuf::from("/app/node_modules/plain/extra.js"))
    );
  }

  #[test]
  fn test_tries_extensions_in_order() {
    let mut fs = MockFileSystem::new();
    fs.expect_is_file()
      .returning(|path| path == Path::new("/app/a.jsx") || path == Path::new("/app/a.ts"));
    fs.expect_is_dir().returning(|_| false);

    let resolver = NodeResolver::with_extensions(
      Arc::new(fs),
      vec![".ts".into(), ".jsx".into()],
    );

    assert_eq!(
      resolver.resolve("./a", Path::new("/app")),
      Ok(PathBuf::from("/app/a.ts"))
    );
  }

  #[test]
  fn test_reports_missing_modules() {
    let resolver = resolver(&[]);

    assert_eq!(
      resolver.resolve("./missing", Path::new("/app")),
      Err(ResolveError::NotFound {
        specifier: "./missing".into(),
        from: PathBuf::from("/app"),
      })
    );
  }

  #[test]
  fn test_reports_invalid_package_json() {
    let resolver = resolver(&[("/app/node_modules/broken/package.json", "{")]);

    assert!(matches!(
      resolver.resolve("broken", Path::new("/app")),
      Err(ResolveError::InvalidPackageJson { .. })
    ));
  }
}
