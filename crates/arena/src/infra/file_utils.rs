use log::info;
use std::{fs, io, path::Path};

pub fn create_folder(folder: &str) -> Result<(), io::Error> {
    let path = Path::new(folder);
    if !path.exists() {
        fs::create_dir_all(path)?;
        info!("Created folder {}", folder);
    }
    Ok(())
}
