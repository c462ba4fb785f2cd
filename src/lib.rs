pub mod canvas;
pub mod history;
pub mod refine;
pub mod session;
pub mod settings;

use std::path::PathBuf;

pub fn default_app_root() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
