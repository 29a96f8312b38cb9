//! Self-signed TLS material for the bundled web endpoints.

use std::os::unix::fs::PermissionsExt;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use cap_std_ext::cap_std::fs::{Dir, Permissions};
use cap_std_ext::dirext::CapStdExtDirExt;
use fn_error_context::context;
use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, SubjectKeyIdentifier,
};
use openssl::x509::{X509Name, X509NameBuilder, X509};

/// Endpoints that get a certificate pair.
pub(crate) const ENDPOINTS: &[&str] = &["apache-html", "apache-phpmyadmin"];

const KEY_DIR: &str = "etc/ssl/private";
const CERT_DIR: &str = "etc/ssl/certs";

pub(crate) const RSA_BITS: u32 = 2048;
pub(crate) const VALIDITY_DAYS: u32 = 3650;

/// Placeholder subject; nobody is expected to verify these.
pub(crate) const SUBJECT: &[(&str, &str)] = &[
    ("C", "XX"),
    ("ST", "StateName"),
    ("L", "CityName"),
    ("O", "CompanyName"),
    ("OU", "CompanySectionName"),
    ("CN", "CommonNameOrHostname"),
];

/// A private key and certificate belonging to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CertificatePair {
    pub(crate) name: String,
    pub(crate) key_path: Utf8PathBuf,
    pub(crate) cert_path: Utf8PathBuf,
}

impl CertificatePair {
    pub(crate) fn for_endpoint(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            key_path: Utf8Path::new(KEY_DIR).join(format!("{name}.key")),
            cert_path: Utf8Path::new(CERT_DIR).join(format!("{name}.crt")),
        }
    }

    /// True only if both files exist. A lone key or certificate does not
    /// count; the pair is then regenerated as a whole.
    #[context("Checking certificate pair {}", self.name)]
    pub(crate) fn is_complete(&self, root: &Dir) -> Result<bool> {
        Ok(root.try_exists(&self.key_path)? && root.try_exists(&self.cert_path)?)
    }
}

/// Produces certificate pairs on disk.
pub(crate) trait CertificateGenerator: std::fmt::Debug {
    /// Write both the key and the certificate of `pair`, replacing any
    /// existing files.
    fn generate(&self, root: &Dir, pair: &CertificatePair) -> Result<()>;
}

/// Generates an RSA key and a self-signed certificate in-process.
#[derive(Debug, Default)]
pub(crate) struct SelfSigned;

fn subject_name() -> Result<X509Name> {
    let mut name = X509NameBuilder::new()?;
    for (field, value) in SUBJECT {
        name.append_entry_by_text(field, value)?;
    }
    Ok(name.build())
}

fn random_serial() -> Result<Asn1Integer> {
    let mut serial = BigNum::new()?;
    serial.rand(159, MsbOption::MAYBE_ZERO, false)?;
    Ok(serial.to_asn1_integer()?)
}

/// Create a fresh key and a certificate for it, signed by itself.
fn self_signed_certificate() -> Result<(PKey<Private>, X509)> {
    let key = PKey::from_rsa(Rsa::generate(RSA_BITS)?)?;
    let name = subject_name()?;

    let mut builder = X509::builder()?;
    builder.set_version(2)?;
    let serial = random_serial()?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(&key)?;
    let not_before = Asn1Time::days_from_now(0)?;
    builder.set_not_before(&not_before)?;
    let not_after = Asn1Time::days_from_now(VALIDITY_DAYS)?;
    builder.set_not_after(&not_after)?;
    builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    let ski = SubjectKeyIdentifier::new().build(&builder.x509v3_context(None, None))?;
    builder.append_extension(ski)?;
    // Must follow the subject key identifier it is derived from
    let aki = AuthorityKeyIdentifier::new()
        .keyid(true)
        .build(&builder.x509v3_context(None, None))?;
    builder.append_extension(aki)?;
    builder.sign(&key, MessageDigest::sha256())?;

    Ok((key, builder.build()))
}

fn write_with_mode(root: &Dir, path: &Utf8Path, contents: &[u8], mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        root.create_dir_all(parent)
            .with_context(|| format!("Creating {parent}"))?;
    }
    let perms = Permissions::from_std(std::fs::Permissions::from_mode(mode));
    root.atomic_write_with_perms(path, contents, perms)
        .with_context(|| format!("Writing {path}"))
}

impl CertificateGenerator for SelfSigned {
    #[context("Generating certificate pair {}", pair.name)]
    fn generate(&self, root: &Dir, pair: &CertificatePair) -> Result<()> {
        let (key, cert) = self_signed_certificate()?;
        // Unencrypted PKCS#8, like `openssl req -nodes`
        write_with_mode(root, &pair.key_path, &key.private_key_to_pem_pkcs8()?, 0o600)?;
        write_with_mode(root, &pair.cert_path, &cert.to_pem()?, 0o644)?;
        Ok(())
    }
}

/// Generate `pair` unless both of its files are already present.
/// Returns whether anything was generated.
pub(crate) fn ensure_pair(
    root: &Dir,
    generator: &dyn CertificateGenerator,
    pair: &CertificatePair,
) -> Result<bool> {
    if pair.is_complete(root)? {
        tracing::info!("Certificate {}: already present", pair.name);
        return Ok(false);
    }
    tracing::info!(
        "Certificate {}: generating {} and {}",
        pair.name,
        pair.key_path,
        pair.cert_path
    );
    generator.generate(root, pair)?;
    Ok(true)
}
