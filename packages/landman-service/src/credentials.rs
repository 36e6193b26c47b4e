//! Portal login storage. Passwords are kept as `base64(nonce || AES-256-GCM ciphertext)`.

use aes_gcm::{
	Aes256Gcm, Key, Nonce,
	aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use secrecy::{ExposeSecret, SecretString};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{BoxFuture, CredentialResolver, Error, LandmanService, Result};
use landman_storage::{credentials, db::Db, models::PortalCredential};

const NONCE_BYTES: usize = 12;
const TAG_BYTES: usize = 16;

/// Decrypted login for one portal. The password never appears in `Debug` output.
#[derive(Debug)]
pub struct PortalLogin {
	pub username: String,
	pub password: SecretString,
}

#[derive(Clone)]
pub struct CredentialVault {
	cipher: Aes256Gcm,
}
impl CredentialVault {
	pub fn new(key: &[u8; landman_config::CREDENTIAL_KEY_BYTES]) -> Self {
		Self { cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)) }
	}

	pub fn from_config(cfg: &landman_config::Security) -> Result<Self> {
		let key = landman_config::decode_credential_key(&cfg.credential_key)
			.map_err(|err| Error::Credential { message: err.to_string() })?;

		Ok(Self::new(&key))
	}

	pub fn encrypt(&self, password: &SecretString) -> Result<String> {
		let mut nonce_bytes = [0_u8; NONCE_BYTES];

		OsRng.fill_bytes(&mut nonce_bytes);

		let ciphertext = self
			.cipher
			.encrypt(Nonce::from_slice(&nonce_bytes), password.expose_secret().as_bytes())
			.map_err(|_| Error::Credential { message: "Failed to encrypt password.".to_string() })?;
		let mut sealed = Vec::with_capacity(NONCE_BYTES + ciphertext.len());

		sealed.extend_from_slice(&nonce_bytes);
		sealed.extend_from_slice(&ciphertext);

		Ok(STANDARD.encode(sealed))
	}

	pub fn decrypt(&self, encoded: &str) -> Result<SecretString> {
		let sealed = STANDARD.decode(encoded.trim()).map_err(|_| Error::Credential {
			message: "Stored password is not valid base64.".to_string(),
		})?;

		if sealed.len() < NONCE_BYTES + TAG_BYTES {
			return Err(Error::Credential { message: "Stored password is truncated.".to_string() });
		}

		let (nonce, ciphertext) = sealed.split_at(NONCE_BYTES);
		let plaintext = self.cipher.decrypt(Nonce::from_slice(nonce), ciphertext).map_err(|_| {
			Error::Credential { message: "Stored password failed to decrypt.".to_string() }
		})?;
		let password = String::from_utf8(plaintext).map_err(|_| Error::Credential {
			message: "Stored password is not valid UTF-8.".to_string(),
		})?;

		Ok(SecretString::from(password))
	}
}
impl std::fmt::Debug for CredentialVault {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CredentialVault").finish_non_exhaustive()
	}
}
impl CredentialResolver for CredentialVault {
	fn resolve<'a>(
		&'a self,
		db: &'a Db,
		user_id: Uuid,
		portal_id: Uuid,
	) -> BoxFuture<'a, Result<Option<PortalLogin>>> {
		Box::pin(async move {
			let Some(stored) =
				credentials::find_active_credential(&db.pool, user_id, portal_id).await?
			else {
				return Ok(None);
			};
			let password = self.decrypt(&stored.encrypted_password)?;

			Ok(Some(PortalLogin { username: stored.username, password }))
		})
	}
}

pub struct StoreCredentialRequest {
	pub user_id: Uuid,
	pub portal_id: Uuid,
	pub username: String,
	pub password: SecretString,
	pub label: Option<String>,
}

impl LandmanService {
	/// Encrypts and stores a portal login for a user.
	pub async fn store_portal_credential(&self, req: StoreCredentialRequest) -> Result<Uuid> {
		let username = req.username.trim();

		if username.is_empty() {
			return Err(Error::InvalidRequest { message: "username is required.".to_string() });
		}
		if req.password.expose_secret().is_empty() {
			return Err(Error::InvalidRequest { message: "password is required.".to_string() });
		}

		let now = OffsetDateTime::now_utc();
		let credential = PortalCredential {
			credential_id: Uuid::new_v4(),
			user_id: req.user_id,
			portal_id: req.portal_id,
			username: username.to_string(),
			encrypted_password: self.vault.encrypt(&req.password)?,
			label: req.label.filter(|label| !label.trim().is_empty()),
			is_active: true,
			created_at: now,
			updated_at: now,
		};

		credentials::insert_portal_credential(&self.db.pool, &credential).await?;

		tracing::info!(
			credential_id = %credential.credential_id,
			portal_id = %credential.portal_id,
			"Stored portal credential."
		);

		Ok(credential.credential_id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn vault() -> CredentialVault {
		CredentialVault::new(&[7_u8; landman_config::CREDENTIAL_KEY_BYTES])
	}

	#[test]
	fn sealed_passwords_open_with_the_same_key_only() {
		let sealed =
			vault().encrypt(&SecretString::from("hunter2".to_string())).expect("encrypt failed");

		assert_eq!(vault().decrypt(&sealed).expect("decrypt failed").expose_secret(), "hunter2");

		let other = CredentialVault::new(&[9_u8; landman_config::CREDENTIAL_KEY_BYTES]);

		assert!(matches!(other.decrypt(&sealed), Err(Error::Credential { .. })));
	}

	#[test]
	fn each_seal_uses_a_fresh_nonce() {
		let password = SecretString::from("hunter2".to_string());

		assert_ne!(
			vault().encrypt(&password).expect("encrypt failed"),
			vault().encrypt(&password).expect("encrypt failed")
		);
	}

	#[test]
	fn malformed_ciphertext_is_a_credential_error() {
		assert!(matches!(vault().decrypt("not base64!"), Err(Error::Credential { .. })));
		assert!(matches!(vault().decrypt("c2hvcnQ="), Err(Error::Credential { .. })));
	}

	#[test]
	fn login_debug_hides_password() {
		let login = PortalLogin {
			username: "landman".to_string(),
			password: SecretString::from("hunter2".to_string()),
		};

		assert!(!format!("{login:?}").contains("hunter2"));
	}
}
