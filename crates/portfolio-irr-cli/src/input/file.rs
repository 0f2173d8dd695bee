use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Read a JSON file and deserialise into a typed struct.
pub fn read_json<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let canonical = resolve_file(path)?;
    let contents = read_text(&canonical)?;
    let value: T = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?;
    Ok(value)
}

/// Read a YAML or JSON file, chosen by extension (`.json` is JSON, anything
/// else is YAML, which also accepts plain JSON).
pub fn read_structured<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let canonical = resolve_file(path)?;
    let contents = read_text(&canonical)?;
    let is_json = canonical
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let value: T = if is_json {
        serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?
    } else {
        serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?
    };
    Ok(value)
}

pub fn read_text(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    Ok(contents)
}

/// Resolve a path against the working directory and check it is a file.
pub fn resolve_file(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let canonical = absolute(path)?;
    if !canonical.exists() {
        return Err(format!("File not found: {}", canonical.display()).into());
    }
    if !canonical.is_file() {
        return Err(format!("Not a file: {}", canonical.display()).into());
    }
    Ok(canonical)
}

/// Resolve a path against the working directory and check it is a directory.
pub fn resolve_dir(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let canonical = absolute(path)?;
    if !canonical.is_dir() {
        return Err(format!("Not a directory: {}", canonical.display()).into());
    }
    Ok(canonical)
}

fn absolute(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let p = Path::new(path);
    Ok(if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    })
}
