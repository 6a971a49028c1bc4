use anyhow::anyhow;
use log::{info, warn};
use rand::RngCore;
use secrecy::SecretString;
use std::{
    fs::{self, metadata, File},
    io::{Read, Write},
    path::Path,
};

/// Loads a shared secret, generating and saving a random one when the file does not exist yet.
/// Used for the JWT and webhook signing secrets in local setups.
pub fn get_or_create_secret(file_path: &str) -> Result<SecretString, anyhow::Error> {
    if metadata(file_path).is_ok() {
        read_secret(file_path)
    } else {
        warn!(
            "No secret found at {}, generating a new one; clients must be given this value",
            file_path
        );
        let secret = generate_secret();
        save_secret(file_path, &secret)?;
        Ok(SecretString::from(secret))
    }
}

/// Loads a secret that has to be provisioned by an operator, such as the gateway api key
pub fn read_secret(file_path: &str) -> Result<SecretString, anyhow::Error> {
    let mut file = File::open(file_path)
        .map_err(|e| anyhow!("Failed to open secret file {}: {}", file_path, e))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Secret file {} is empty", file_path));
    }
    Ok(SecretString::from(trimmed.to_string()))
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn save_secret(file_path: &str, secret: &str) -> Result<(), anyhow::Error> {
    if let Some(parent) = Path::new(file_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = File::create(file_path)?;
    file.write_all(secret.as_bytes())?;
    info!("Saved generated secret to {}", file_path);
    Ok(())
}
