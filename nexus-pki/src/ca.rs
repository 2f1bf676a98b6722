//! The self-managed root certificate authority.
//!
//! One RSA keypair and one self-signed root certificate, generated on
//! first start and persisted with owner-only permissions. The key is
//! read-only after load and shared freely across the issuer and the token
//! issuer.

use crate::{PkiError, PkiResult};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, SerialNumber, PKCS_RSA_SHA256,
};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the persisted CA private key (PKCS#8 PEM).
pub const CA_KEY_FILE: &str = "ca_key.pem";

/// File name of the persisted CA certificate (PEM).
pub const CA_CERT_FILE: &str = "ca_cert.pem";

/// Root certificate validity: ten years.
pub const CA_VALIDITY_DAYS: i64 = 3650;

/// Default modulus size for the root key.
pub const CA_KEY_BITS: usize = 4096;

const CA_COMMON_NAME: &str = "Nexus Agent Registry Root CA";
const CA_ORGANIZATION: &str = "Nexus Agent Protocol";

/// Holder of the root keypair and certificate.
///
/// Construction either loads previously persisted material or generates
/// and persists fresh material. Key rotation is not supported; rotating
/// the CA would invalidate every outstanding endorsement JWT.
pub struct CaManager {
    key_pem: String,
    key_pair: KeyPair,
    cert: Certificate,
    cert_pem: String,
    public_key: rsa::RsaPublicKey,
    key_bits: usize,
}

impl CaManager {
    /// Load CA material from `dir`, generating and persisting an RSA-4096
    /// root on first run.
    pub fn load_or_create(dir: impl AsRef<Path>) -> PkiResult<Self> {
        Self::load_or_create_with_bits(dir, CA_KEY_BITS)
    }

    /// Same as [`CaManager::load_or_create`] with a caller-chosen modulus
    /// size. Sizes below 4096 are for tests only.
    pub fn load_or_create_with_bits(dir: impl AsRef<Path>, bits: usize) -> PkiResult<Self> {
        let dir = dir.as_ref();
        let key_path = dir.join(CA_KEY_FILE);
        let cert_path = dir.join(CA_CERT_FILE);

        if key_path.exists() && cert_path.exists() {
            Self::load(&key_path, &cert_path, bits)
        } else {
            Self::create(dir, &key_path, &cert_path, bits)
        }
    }

    fn load(key_path: &Path, cert_path: &Path, bits: usize) -> PkiResult<Self> {
        let key_pem = read_file(key_path)?;
        let cert_pem = read_file(cert_path)?;

        let key_pair = KeyPair::from_pem_and_sign_algo(&key_pem, &PKCS_RSA_SHA256)
            .map_err(|e| PkiError::KeyEncoding {
                reason: format!("CA key PEM did not parse: {}", e),
            })?;
        let params = CertificateParams::from_ca_cert_pem(&cert_pem).map_err(|e| {
            PkiError::KeyEncoding {
                reason: format!("CA certificate PEM did not parse: {}", e),
            }
        })?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| PkiError::CertBuild {
                reason: e.to_string(),
            })?;

        let private = RsaPrivateKey::from_pkcs8_pem(&key_pem).map_err(|e| {
            PkiError::KeyEncoding {
                reason: format!("CA key is not PKCS#8 RSA: {}", e),
            }
        })?;
        let public_key = private.to_public_key();

        tracing::info!(path = %key_path.display(), "Loaded existing CA material");

        Ok(CaManager {
            key_pem,
            key_pair,
            cert,
            cert_pem,
            public_key,
            key_bits: bits,
        })
    }

    fn create(dir: &Path, key_path: &Path, cert_path: &Path, bits: usize) -> PkiResult<Self> {
        fs::create_dir_all(dir).map_err(|e| persistence(dir, e))?;

        let private =
            RsaPrivateKey::new(&mut rand::rngs::OsRng, bits).map_err(|e| {
                PkiError::KeyGeneration {
                    reason: e.to_string(),
                }
            })?;
        let key_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| PkiError::KeyEncoding {
                reason: e.to_string(),
            })?
            .to_string();
        let public_key = private.to_public_key();

        let key_pair = KeyPair::from_pem_and_sign_algo(&key_pem, &PKCS_RSA_SHA256)
            .map_err(|e| PkiError::KeyEncoding {
                reason: e.to_string(),
            })?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, CA_COMMON_NAME);
        dn.push(DnType::OrganizationName, CA_ORGANIZATION);
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.not_before = time::OffsetDateTime::now_utc();
        params.not_after =
            time::OffsetDateTime::now_utc() + time::Duration::days(CA_VALIDITY_DAYS);
        params.serial_number = Some(SerialNumber::from_slice(&random_serial_bytes()));

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| PkiError::CertBuild {
                reason: e.to_string(),
            })?;
        let cert_pem = cert.pem();

        write_private(key_path, key_pem.as_bytes())?;
        write_private(cert_path, cert_pem.as_bytes())?;

        tracing::info!(path = %dir.display(), bits, "Generated and persisted new CA root");

        Ok(CaManager {
            key_pem,
            key_pair,
            cert,
            cert_pem,
            public_key,
            key_bits: bits,
        })
    }

    /// PEM of the root certificate, for distribution.
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// PKCS#8 PEM of the CA private key. Used by the token issuer for
    /// RS256 signing; never serialized into responses.
    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }

    /// The RSA public half, for JWKS component export.
    pub fn public_key(&self) -> &rsa::RsaPublicKey {
        &self.public_key
    }

    /// Modulus size of the root key.
    pub fn key_bits(&self) -> usize {
        self.key_bits
    }

    /// Sign a leaf certificate described by `params` for `subject_key`.
    /// Returns the signed certificate PEM.
    pub fn sign(&self, params: CertificateParams, subject_key: &KeyPair) -> PkiResult<String> {
        let cert = params
            .signed_by(subject_key, &self.cert, &self.key_pair)
            .map_err(|e| PkiError::CertBuild {
                reason: e.to_string(),
            })?;
        Ok(cert.pem())
    }

    /// SHA-256 fingerprint of the public key DER; doubles as the JWKS key
    /// id.
    pub fn key_fingerprint(&self) -> PkiResult<String> {
        let der = self
            .public_key
            .to_public_key_der()
            .map_err(|e| PkiError::KeyEncoding {
                reason: e.to_string(),
            })?;
        Ok(hex::encode(Sha256::digest(der.as_bytes())))
    }
}

/// 128-bit cryptographically random serial.
pub(crate) fn random_serial_bytes() -> [u8; 16] {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

fn read_file(path: &Path) -> PkiResult<String> {
    fs::read_to_string(path).map_err(|e| persistence(path, e))
}

/// Write a file and restrict it to the owning user.
fn write_private(path: &Path, contents: &[u8]) -> PkiResult<()> {
    fs::write(path, contents).map_err(|e| persistence(path, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| persistence(path, e))?;
    }
    Ok(())
}

fn persistence(path: impl Into<PathBuf>, e: std::io::Error) -> PkiError {
    PkiError::Persistence {
        path: path.into().display().to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2048-bit keys keep these tests fast; production stays at 4096 via
    // the default constructor.
    const TEST_BITS: usize = 2048;

    #[test]
    fn creates_and_reloads_same_material() {
        let dir = tempfile::tempdir().unwrap();
        let created = CaManager::load_or_create_with_bits(dir.path(), TEST_BITS).unwrap();
        assert!(created.cert_pem().contains("BEGIN CERTIFICATE"));
        assert!(created.key_pem().contains("BEGIN PRIVATE KEY"));

        let reloaded = CaManager::load_or_create_with_bits(dir.path(), TEST_BITS).unwrap();
        assert_eq!(created.cert_pem(), reloaded.cert_pem());
        assert_eq!(created.key_pem(), reloaded.key_pem());
        assert_eq!(
            created.key_fingerprint().unwrap(),
            reloaded.key_fingerprint().unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn persisted_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        CaManager::load_or_create_with_bits(dir.path(), TEST_BITS).unwrap();

        for name in [CA_KEY_FILE, CA_CERT_FILE] {
            let mode = fs::metadata(dir.path().join(name))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600, "{} must be mode 0600", name);
        }
    }

    #[test]
    fn default_bits_are_4096() {
        assert_eq!(CA_KEY_BITS, 4096);
    }
}
