//! Scanning a directory for `*.token` credential files.

use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use log::debug;

use super::{TokenError, TokenMap};

/// File name suffix identifying token files.
pub const TOKEN_SUFFIX: &str = ".token";

/// Build a [`TokenMap`] from the `*.token` files in `dir`.
///
/// Files are visited in ascending file-name order, which fixes the tie-break
/// used by [`TokenMap::resolve`]. Dotfiles and directories are skipped, as a
/// shell glob would. Any token file that cannot be read fails the whole scan.
pub fn load_tokens(dir: impl AsRef<Path>) -> Result<TokenMap, TokenError> {
    let dir = dir.as_ref();
    let directory_err = |source| TokenError::Directory {
        path: dir.to_path_buf(),
        source,
    };

    let mut candidates: Vec<(String, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir).map_err(directory_err)? {
        let entry = entry.map_err(directory_err)?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            debug!("skipping non UTF-8 file name in token directory: {file_name:?}");
            continue;
        };
        if token_key(name).is_some() {
            candidates.push((name.to_owned(), entry.path()));
        }
    }
    candidates.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut tokens = TokenMap::new();
    for (file_name, path) in candidates {
        let Some(key) = token_key(&file_name) else {
            continue;
        };
        let file_err = |source| TokenError::File {
            path: path.clone(),
            source,
        };
        // Follows symlinks so a dangling link surfaces as an unreadable file.
        if !fs::metadata(&path).map_err(file_err)?.is_file() {
            continue;
        }
        let token = read_token(&path).map_err(file_err)?;
        tokens.insert(key, token);
    }
    Ok(tokens)
}

fn token_key(file_name: &str) -> Option<&str> {
    if file_name.starts_with('.') {
        return None;
    }
    file_name.strip_suffix(TOKEN_SUFFIX)
}

/// Read the token stored in `path`.
///
/// The token is the first line of the file with every `\r` and `\n`
/// removed. An empty file has no first line and is reported as
/// [`io::ErrorKind::UnexpectedEof`].
pub fn read_token(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "token file is empty",
        ));
    }
    let mut token = String::from_utf8(line).map_err(|err| {
        io::Error::new(io::ErrorKind::InvalidData, err.utf8_error())
    })?;
    token.retain(|c| c != '\r' && c != '\n');
    Ok(token)
}
