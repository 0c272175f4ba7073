use crate::core::config::data::{path_display, Config};
use std::path::Path;

impl Config {
    pub fn print_all(&self, default_storage_dir: &Path) {
        println!("Current configuration:");
        match &self.storage_dir {
            Some(dir) => println!("  storage-dir: {}", path_display(dir)),
            None => println!(
                "  storage-dir: (unset, using {})",
                path_display(default_storage_dir)
            ),
        }
        match self.keep_original_package() {
            true => println!("  keep-original-package: on"),
            false => println!("  keep-original-package: off"),
        }
        match &self.log_filter {
            Some(filter) => println!("  log-filter: {filter}"),
            None => println!("  log-filter: (unset, using {})", self.log_filter()),
        }
    }
}
