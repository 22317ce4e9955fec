use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sealchat_core::crypto::{engine, generate_nonce};
use sealchat_core::{account, codec, Config, KeyManager, Nonce, PublicKey};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sealchat-keytool")]
#[command(version)]
#[command(about = "Manage the private keys of sealchat identities on this device")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and store a key pair for a new identity
    Keygen {
        #[arg(short, long)]
        identity: String,
    },

    /// Store a private key issued by the server at signup
    AcceptKey {
        #[arg(short, long)]
        identity: String,

        /// Encoded private key
        #[arg(short, long)]
        key: String,
    },

    /// Print the public key and fingerprint of a stored identity
    Show {
        #[arg(short, long)]
        identity: String,
    },

    /// Write a backup file of the private key
    Export {
        #[arg(short, long)]
        identity: String,

        /// Name used for the backup file (defaults to the identity id)
        #[arg(short, long)]
        name: Option<String>,

        /// Directory to write the backup into
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Restore a private key from a backup file, replacing any stored key
    Import {
        #[arg(short, long)]
        identity: String,

        file: PathBuf,
    },

    /// Delete the stored private key
    Remove {
        #[arg(short, long)]
        identity: String,

        /// Confirm deletion; without a backup the key is gone for good
        #[arg(long)]
        yes: bool,
    },

    /// Encrypt a text for a recipient public key
    Encrypt {
        #[arg(short, long)]
        identity: String,

        /// Recipient public key
        #[arg(long)]
        to: String,

        #[arg(short, long)]
        text: String,
    },

    /// Decrypt a ciphertext from a sender public key
    Decrypt {
        #[arg(short, long)]
        identity: String,

        /// Sender public key
        #[arg(long)]
        from: String,

        #[arg(short, long)]
        nonce: String,

        #[arg(short, long)]
        ciphertext: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    let keys = config.key_manager();

    run(cli.command, &keys, &mut io::stdout().lock())
}

fn run(command: Commands, keys: &KeyManager, out: &mut impl Write) -> Result<()> {
    match command {
        Commands::Keygen { identity } => {
            let public_key = account::enroll(keys, &identity)?;
            print_public_key(out, &public_key)?;
        }
        Commands::AcceptKey { identity, key } => {
            let public_key = account::accept_issued_key(keys, &identity, &key)?;
            print_public_key(out, &public_key)?;
        }
        Commands::Show { identity } => match keys.public_key(&identity)? {
            Some(public_key) => print_public_key(out, &public_key)?,
            None => bail!("No private key stored for {}", identity),
        },
        Commands::Export {
            identity,
            name,
            out: dir,
        } => {
            let export = keys.export_to_file(&identity, name.as_deref().unwrap_or(&identity))?;
            let path = dir.join(&export.file_name);
            fs::write(&path, &export.contents)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(identity = %identity, path = %path.display(), "Key backup written");
            writeln!(out, "Private key written to {}", path.display())?;
        }
        Commands::Import { identity, file } => {
            let contents =
                fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            if keys.exists(&identity) {
                warn!(
                    identity = %identity,
                    file = %file.display(),
                    "Replacing the stored private key"
                );
            }
            keys.import(&contents, &identity)?;
            writeln!(out, "Private key imported for {}", identity)?;
        }
        Commands::Remove { identity, yes } => {
            if !yes {
                bail!("Refusing to delete the private key without --yes; export a backup first");
            }
            warn!(identity = %identity, "Deleting stored private key");
            keys.remove(&identity)?;
            writeln!(out, "Private key removed for {}", identity)?;
        }
        Commands::Encrypt { identity, to, text } => {
            let private_key = keys
                .load(&identity)?
                .with_context(|| format!("No private key stored for {}", identity))?;
            let recipient = PublicKey::from_encoded(&to).context("Invalid recipient key")?;

            let nonce = generate_nonce();
            let ciphertext = engine::encrypt(text.as_bytes(), &nonce, &recipient, &private_key)?;
            writeln!(out, "nonce: {}", nonce.to_encoded())?;
            writeln!(out, "ciphertext: {}", codec::encode(ciphertext))?;
        }
        Commands::Decrypt {
            identity,
            from,
            nonce,
            ciphertext,
        } => {
            let private_key = keys
                .load(&identity)?
                .with_context(|| format!("No private key stored for {}", identity))?;
            let sender = PublicKey::from_encoded(&from).context("Invalid sender key")?;
            let nonce = Nonce::from_encoded(&nonce).context("Invalid nonce")?;
            let ciphertext = codec::decode(&ciphertext).context("Invalid ciphertext")?;

            let plaintext = engine::decrypt(&ciphertext, &nonce, &sender, &private_key)?;
            writeln!(out, "{}", String::from_utf8_lossy(&plaintext))?;
        }
    }
    Ok(())
}

fn print_public_key(out: &mut impl Write, public_key: &PublicKey) -> Result<()> {
    writeln!(out, "public key:  {}", public_key.to_encoded())?;
    writeln!(out, "fingerprint: {}", public_key.fingerprint())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealchat_core::crypto::FileStore;
    use std::sync::Arc;

    fn exec(keys: &KeyManager, args: &[&str]) -> Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("sealchat-keytool").chain(args.iter().copied()))?;
        let mut out = Vec::new();
        run(cli.command, keys, &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    fn value_of<'a>(output: &'a str, label: &str) -> &'a str {
        output
            .lines()
            .find_map(|line| line.strip_prefix(label))
            .unwrap()
            .trim()
    }

    #[test]
    fn test_keygen_then_show() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(Arc::new(FileStore::new(dir.path())));

        let generated = exec(&keys, &["keygen", "-i", "alice"]).unwrap();
        let shown = exec(&keys, &["show", "-i", "alice"]).unwrap();
        assert_eq!(generated, shown);
        assert_eq!(value_of(&shown, "fingerprint:").len(), 39);

        assert!(exec(&keys, &["keygen", "-i", "alice"]).is_err());
        assert!(exec(&keys, &["show", "-i", "bob"]).is_err());
    }

    #[test]
    fn test_export_import_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(Arc::new(FileStore::new(dir.path().join("keys"))));
        exec(&keys, &["keygen", "-i", "alice"]).unwrap();

        let out_dir = dir.path().to_str().unwrap();
        exec(&keys, &["export", "-i", "alice", "-n", "Alice Smith", "-o", out_dir]).unwrap();
        let backup = dir.path().join("Alice_Smith_private_key.txt");
        assert!(backup.exists());

        exec(&keys, &["import", "-i", "alice-laptop", backup.to_str().unwrap()]).unwrap();
        assert_eq!(keys.load("alice-laptop").unwrap(), keys.load("alice").unwrap());
    }

    #[test]
    fn test_remove_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(Arc::new(FileStore::new(dir.path())));
        exec(&keys, &["keygen", "-i", "alice"]).unwrap();

        assert!(exec(&keys, &["remove", "-i", "alice"]).is_err());
        assert!(keys.exists("alice"));

        exec(&keys, &["remove", "-i", "alice", "--yes"]).unwrap();
        assert!(!keys.exists("alice"));

        assert!(exec(&keys, &["remove", "-i", "", "--yes"]).is_err());
    }

    #[test]
    fn test_import_replaces_existing_key() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(Arc::new(FileStore::new(dir.path().join("keys"))));
        exec(&keys, &["keygen", "-i", "alice"]).unwrap();
        exec(&keys, &["keygen", "-i", "bob"]).unwrap();

        let out_dir = dir.path().to_str().unwrap();
        exec(&keys, &["export", "-i", "bob", "-o", out_dir]).unwrap();
        let backup = dir.path().join("bob_private_key.txt");

        exec(&keys, &["import", "-i", "alice", backup.to_str().unwrap()]).unwrap();
        assert_eq!(keys.load("alice").unwrap(), keys.load("bob").unwrap());
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(Arc::new(FileStore::new(dir.path())));
        let alice = value_of(&exec(&keys, &["keygen", "-i", "alice"]).unwrap(), "public key:").to_string();
        let bob = value_of(&exec(&keys, &["keygen", "-i", "bob"]).unwrap(), "public key:").to_string();

        let sealed = exec(&keys, &["encrypt", "-i", "alice", "--to", &bob, "-t", "hello"]).unwrap();
        let nonce = value_of(&sealed, "nonce:");
        let ciphertext = value_of(&sealed, "ciphertext:");

        let opened = exec(
            &keys,
            &["decrypt", "-i", "bob", "--from", &alice, "-n", nonce, "-c", ciphertext],
        )
        .unwrap();
        assert_eq!(opened.trim(), "hello");
    }
}
