//! cryptkit command-line tool
//!
//! Thin front end over the kernel: status lookups, algorithm listing,
//! hashing, password envelopes and self-signed certificates. Results are
//! printed as JSON.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use cryptkit_core::{logging, status_message, CryptError, ErrorCode, KernelConfig, StatusClass};
use cryptkit_crypto::{Algorithm, AlgorithmClass};
use cryptkit_kernel::{AttributeId, CapabilityInfo, CertFormat, CertType, EnvelopeFormat, Handle, Kernel};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const READ_CHUNK: usize = 64 * 1024;

#[derive(Parser, Debug)]
#[command(name = "cryptkit-tool", version, about = "cryptkit security kernel tool")]
struct Args {
    /// Kernel configuration file (TOML)
    #[arg(short, long, env = "CRYPTKIT_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Describe a numeric status code
    Status {
        #[arg(allow_negative_numbers = true)]
        code: i32,
    },
    /// List the algorithms the kernel provides
    Algorithms,
    /// Hash a file
    Hash {
        #[arg(long, default_value = "SHA2-256")]
        algo: String,
        file: PathBuf,
    },
    /// Envelope a file under a password
    Seal {
        #[arg(long, env = "CRYPTKIT_PASSWORD")]
        password: String,
        input: PathBuf,
        output: PathBuf,
    },
    /// De-envelope a password-protected file
    Open {
        #[arg(long, env = "CRYPTKIT_PASSWORD")]
        password: String,
        input: PathBuf,
        output: PathBuf,
    },
    /// Create a self-signed certificate and write it in PEM-style armour
    CertSelfsign {
        #[arg(long)]
        cn: String,
        #[arg(long)]
        org: Option<String>,
        #[arg(long)]
        country: Option<String>,
        /// Mark the certificate as a CA
        #[arg(long)]
        ca: bool,
        output: PathBuf,
    },
}

#[derive(Debug, Serialize)]
struct StatusOutput {
    code: i32,
    name: &'static str,
    message: &'static str,
    class: &'static str,
}

#[derive(Debug, Serialize)]
struct HashOutput {
    algorithm: &'static str,
    file: String,
    size: u64,
    hash: String,
}

#[derive(Debug, Serialize)]
struct EnvelopeOutput {
    input: String,
    output: String,
    input_size: usize,
    output_size: usize,
}

#[derive(Debug, Serialize)]
struct CertOutput {
    common_name: String,
    output: String,
    fingerprint: String,
}

fn main() {
    let args = Args::parse();
    if args.json_logs {
        logging::init_json();
    } else {
        logging::init_with_level("warn");
    }
    if let Err(err) = run(args) {
        eprintln!("Error: {err:#}");
        let code = err
            .downcast_ref::<CryptError>()
            .map(|e| e.code())
            .unwrap_or(ErrorCode::Failed as i32);
        std::process::exit(code.unsigned_abs().min(255) as i32);
    }
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Status { code } => print(&describe_status(code)),
        Command::Algorithms => print(&algorithms()),
        command => {
            let config = match &args.config {
                Some(path) => KernelConfig::from_file(path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => KernelConfig::default(),
            };
            let kernel = Kernel::new(config)?;
            let result = dispatch(&kernel, command);
            kernel.shutdown()?;
            result
        }
    }
}

fn dispatch(kernel: &Kernel, command: Command) -> Result<()> {
    match command {
        Command::Hash { algo, file } => print(&hash_file(kernel, &algo, &file)?),
        Command::Seal { password, input, output } => {
            print(&envelope_file(kernel, EnvelopeFormat::Cryptlib, &password, &input, &output)?)
        }
        Command::Open { password, input, output } => {
            print(&envelope_file(kernel, EnvelopeFormat::Auto, &password, &input, &output)?)
        }
        Command::CertSelfsign { cn, org, country, ca, output } => {
            print(&self_signed(kernel, &cn, org.as_deref(), country.as_deref(), ca, &output)?)
        }
        Command::Status { .. } | Command::Algorithms => Ok(()),
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn describe_status(code: i32) -> StatusOutput {
    StatusOutput {
        code,
        name: ErrorCode::from_raw(code).map(ErrorCode::name).unwrap_or(if code == 0 {
            "CRYPT_OK"
        } else {
            "UNKNOWN"
        }),
        message: status_message(code),
        class: StatusClass::of(code).label(),
    }
}

fn algorithms() -> Vec<CapabilityInfo> {
    Algorithm::all().iter().copied().map(CapabilityInfo::of).collect()
}

fn hash_file(kernel: &Kernel, algo: &str, file: &Path) -> Result<HashOutput> {
    let algorithm = Algorithm::from_name(algo).ok_or_else(|| anyhow!("unknown algorithm {algo}"))?;
    if algorithm.class() != AlgorithmClass::Hash {
        bail!("{} is not a hash algorithm", algorithm.name());
    }
    let data = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let ctx = kernel.create_context(None, algorithm.id())?;
    let hashed = hash_with(kernel, ctx, &data);
    kernel.destroy_context(ctx)?;
    let hash = hashed?;
    debug!(file = %file.display(), bytes = data.len(), "file hashed");
    Ok(HashOutput {
        algorithm: algorithm.name(),
        file: file.display().to_string(),
        size: data.len() as u64,
        hash: hex::encode(hash),
    })
}

fn hash_with(kernel: &Kernel, ctx: Handle, data: &[u8]) -> Result<Vec<u8>> {
    for chunk in data.chunks(READ_CHUNK) {
        let mut chunk = chunk.to_vec();
        kernel.encrypt(ctx, &mut chunk)?;
    }
    kernel.encrypt(ctx, &mut [])?;
    Ok(kernel.get_attribute_bytes(ctx, AttributeId::CTXINFO_HASHVALUE)?)
}

fn envelope_file(
    kernel: &Kernel,
    format: EnvelopeFormat,
    password: &str,
    input: &Path,
    output: &Path,
) -> Result<EnvelopeOutput> {
    if password.is_empty() {
        bail!("password must not be empty");
    }
    let data = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let envelope = kernel.create_envelope(None, format)?;
    let processed = process(kernel, envelope, format, password, &data);
    kernel.destroy_envelope(envelope)?;
    let processed = processed?;
    fs::write(output, &processed).with_context(|| format!("writing {}", output.display()))?;
    info!(input = %input.display(), output = %output.display(), "envelope written");
    Ok(EnvelopeOutput {
        input: input.display().to_string(),
        output: output.display().to_string(),
        input_size: data.len(),
        output_size: processed.len(),
    })
}

fn process(kernel: &Kernel, envelope: Handle, format: EnvelopeFormat, password: &str, data: &[u8]) -> Result<Vec<u8>> {
    if format != EnvelopeFormat::Auto {
        kernel.set_attribute_string(envelope, AttributeId::ENVINFO_PASSWORD, password.as_bytes())?;
        return Ok(kernel.process_all(envelope, data)?);
    }
    // The password can only be supplied once the header asks for it.
    match kernel.push_data(envelope, data) {
        Err(e) if e.is(ErrorCode::EnvelopeResource) => {}
        Err(e) => return Err(e.into()),
        Ok(_) => bail!("envelope is not password protected"),
    }
    kernel.set_attribute_string(envelope, AttributeId::ENVINFO_PASSWORD, password.as_bytes())?;
    Ok(kernel.process_all(envelope, data)?)
}

fn self_signed(
    kernel: &Kernel,
    cn: &str,
    org: Option<&str>,
    country: Option<&str>,
    ca: bool,
    output: &Path,
) -> Result<CertOutput> {
    let key = kernel.create_context(None, Algorithm::Ed25519.id())?;
    let cert = kernel.create_cert(None, CertType::Certificate)?;
    let built = build_cert(kernel, key, cert, cn, org, country, ca);
    let exported = built.and_then(|()| {
        let len = kernel.export_cert(None, CertFormat::TextCertificate, cert)?;
        let mut encoded = vec![0u8; len];
        kernel.export_cert(Some(&mut encoded), CertFormat::TextCertificate, cert)?;
        let fingerprint = kernel.get_attribute_bytes(cert, AttributeId::CERTINFO_FINGERPRINT_SHA)?;
        Ok((encoded, fingerprint))
    });
    kernel.destroy_cert(cert)?;
    kernel.destroy_context(key)?;
    let (encoded, fingerprint) = exported?;
    fs::write(output, &encoded).with_context(|| format!("writing {}", output.display()))?;
    Ok(CertOutput {
        common_name: cn.to_string(),
        output: output.display().to_string(),
        fingerprint: hex::encode(fingerprint),
    })
}

fn build_cert(
    kernel: &Kernel,
    key: Handle,
    cert: Handle,
    cn: &str,
    org: Option<&str>,
    country: Option<&str>,
    ca: bool,
) -> Result<()> {
    kernel.generate_key(key)?;
    if let Some(country) = country {
        kernel.set_attribute_string(cert, AttributeId::CERTINFO_COUNTRYNAME, country.as_bytes())?;
    }
    if let Some(org) = org {
        kernel.set_attribute_string(cert, AttributeId::CERTINFO_ORGANIZATIONNAME, org.as_bytes())?;
    }
    kernel.set_attribute_string(cert, AttributeId::CERTINFO_COMMONNAME, cn.as_bytes())?;
    if ca {
        kernel.set_attribute(cert, AttributeId::CERTINFO_CA, 1)?;
    }
    kernel.set_attribute(cert, AttributeId::CERTINFO_SUBJECTPUBLICKEYINFO, key.raw())?;
    kernel.sign_cert(cert, key)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn kernel() -> Kernel {
        Kernel::new(KernelConfig::default()).unwrap()
    }

    #[test]
    fn test_describe_status() {
        let out = describe_status(-33);
        assert_eq!(out.name, "CRYPT_ERROR_SIGNATURE");
        assert_eq!(out.class, "high-level function error");
        assert_eq!(describe_status(0).name, "CRYPT_OK");
        assert_eq!(describe_status(-999).message, "Unknown error");
    }

    #[test]
    fn test_algorithm_listing() {
        let list = algorithms();
        assert_eq!(list.len(), Algorithm::all().len());
        assert!(list.iter().any(|info| info.name == "Ed25519"));
    }

    #[test]
    fn test_hash_file_matches_engine() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, b"abc").unwrap();
        let kernel = kernel();
        let out = hash_file(&kernel, "sha2-256", &path).unwrap();
        assert_eq!(
            out.hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(hash_file(&kernel, "ChaCha20", &path).is_err());
        kernel.shutdown().unwrap();
    }

    #[test]
    fn test_seal_and_open_file() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("plain.txt");
        let sealed = dir.path().join("plain.ck");
        let opened = dir.path().join("opened.txt");
        fs::write(&plain, b"attack at dawn").unwrap();
        let kernel = kernel();
        envelope_file(&kernel, EnvelopeFormat::Cryptlib, "pw", &plain, &sealed).unwrap();
        envelope_file(&kernel, EnvelopeFormat::Auto, "pw", &sealed, &opened).unwrap();
        assert_eq!(fs::read(&opened).unwrap(), b"attack at dawn");
        assert!(envelope_file(&kernel, EnvelopeFormat::Auto, "wrong", &sealed, &opened).is_err());
        kernel.shutdown().unwrap();
    }

    #[test]
    fn test_self_signed_certificate_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("root.pem");
        let kernel = kernel();
        let out = self_signed(&kernel, "Test Root", Some("Example"), Some("NZ"), true, &path).unwrap();
        assert_eq!(out.fingerprint.len(), 64);
        let imported = kernel.import_cert(&fs::read(&path).unwrap(), None).unwrap();
        kernel.check_cert(imported, None).unwrap();
        kernel.destroy_cert(imported).unwrap();
        kernel.shutdown().unwrap();
    }

    #[test]
    fn test_cli_parses_negative_status() {
        let args = Args::try_parse_from(["cryptkit-tool", "status", "-21"]).unwrap();
        assert!(matches!(args.command, Command::Status { code: -21 }));
    }
}
