//! Token directory fixtures.

use std::fs;

use tempfile::TempDir;

/// Create a temporary token directory holding `(key, contents)` files.
pub fn token_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("create token directory");
    for (key, contents) in files {
        fs::write(dir.path().join(format!("{key}.token")), contents).expect("write token file");
    }
    dir
}
