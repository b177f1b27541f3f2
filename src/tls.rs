//! Server certificate verification policies used with rustls.
use std::time::SystemTime;

use rustls::{
	client::{ServerCertVerified, ServerCertVerifier, WebPkiVerifier},
	Certificate, RootCertStore, ServerName,
};

use crate::error::Error;

/// Accepts any server certificate. Only used when verification has been
/// explicitly disabled.
pub(crate) struct NoVerification;

impl ServerCertVerifier for NoVerification {
	fn verify_server_cert(
		&self,
		_end_entity: &Certificate,
		_intermediates: &[Certificate],
		_server_name: &ServerName,
		_scts: &mut dyn Iterator<Item = &[u8]>,
		_ocsp_response: &[u8],
		_now: SystemTime,
	) -> Result<ServerCertVerified, rustls::Error> {
		Ok(ServerCertVerified::assertion())
	}
}

/// Verifies the certificate chain against the trusted roots, but checks the
/// configured name instead of the host that was connected to.
pub(crate) struct ExpectedNameVerifier {
	/// Chain and name validation
	inner: WebPkiVerifier,
	/// The name the certificate has to be valid for
	name: ServerName,
}

impl ExpectedNameVerifier {
	/// Create a verifier for `name` trusting `roots`.
	pub(crate) fn new(roots: RootCertStore, name: &str) -> Result<Self, Error> {
		let name = ServerName::try_from(name)
			.map_err(|_| Error::Invalid(format!("Invalid TLS server name `{name}`")))?;
		Ok(Self { inner: WebPkiVerifier::new(roots, None), name })
	}
}

impl ServerCertVerifier for ExpectedNameVerifier {
	fn verify_server_cert(
		&self,
		end_entity: &Certificate,
		intermediates: &[Certificate],
		_server_name: &ServerName,
		scts: &mut dyn Iterator<Item = &[u8]>,
		ocsp_response: &[u8],
		now: SystemTime,
	) -> Result<ServerCertVerified, rustls::Error> {
		self.inner.verify_server_cert(
			end_entity,
			intermediates,
			&self.name,
			scts,
			ocsp_response,
			now,
		)
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use std::time::SystemTime;

	use rustls::{client::ServerCertVerifier, Certificate, RootCertStore, ServerName};

	use super::{ExpectedNameVerifier, NoVerification};
	use crate::error::Error;

	#[test]
	fn invalid_server_name() {
		assert!(matches!(
			ExpectedNameVerifier::new(RootCertStore::empty(), "not a host name"),
			Err(Error::Invalid(_))
		));
		assert!(ExpectedNameVerifier::new(RootCertStore::empty(), "dc1.example.com").is_ok());
	}

	#[test]
	fn expected_name_rejects_untrusted_chain() {
		let verifier =
			ExpectedNameVerifier::new(RootCertStore::empty(), "dc1.example.com").unwrap();
		let connected_to = ServerName::try_from("dc2.example.com").unwrap();
		let result = verifier.verify_server_cert(
			&Certificate(b"not a certificate".to_vec()),
			&[],
			&connected_to,
			&mut std::iter::empty::<&[u8]>(),
			&[],
			SystemTime::now(),
		);
		assert!(result.is_err(), "Garbage must not pass chain validation");
	}

	#[test]
	fn no_verification_accepts_anything() {
		let result = NoVerification.verify_server_cert(
			&Certificate(Vec::new()),
			&[],
			&ServerName::try_from("dc1.example.com").unwrap(),
			&mut std::iter::empty::<&[u8]>(),
			&[],
			SystemTime::now(),
		);
		assert!(result.is_ok());
	}
}
