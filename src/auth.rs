//! Binding as the service identity and verifying user credentials.
use tracing::debug;

use crate::{config::Config, error::Error, session::DirectoryConnection};

/// LDAP result code `invalidCredentials` (RFC 4511, section 4.1.9)
const INVALID_CREDENTIALS: u32 = 49;

/// Outcome of checking a credential against the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
	/// The server accepted the credential.
	Verified,
	/// The server rejected the credential.
	InvalidCredential,
}

/// Performs the binds operations need before they are allowed.
#[derive(Debug, Clone, Copy)]
pub struct Authenticator<'a> {
	/// Identity and password of the service account, if configured
	service: Option<(&'a str, &'a str)>,
}

impl<'a> Authenticator<'a> {
	/// Create an authenticator using the service identity of `config`.
	#[must_use]
	pub fn new(config: &'a Config) -> Self {
		Self { service: config.service_identity() }
	}

	/// Bind as the service identity. Without one, access is anonymous and
	/// nothing is sent.
	pub async fn bind_service(&self, connection: &mut dyn DirectoryConnection) -> Result<(), Error> {
		match self.service {
			Some((dn, password)) => connection.simple_bind(dn, password).await,
			None => Ok(()),
		}
	}

	/// Check `credential` by binding as `dn`.
	///
	/// A rejected credential is a normal outcome and returned as
	/// [`Verification::InvalidCredential`], not as an error. Afterwards the
	/// connection is bound as the service identity again, if there is one. If
	/// that rebind fails, [`Error::Rebind`] carries the verification outcome.
	/// Its record is left for the caller to fill in.
	pub async fn verify_credential(
		&self,
		connection: &mut dyn DirectoryConnection,
		dn: &str,
		credential: &str,
	) -> Result<Verification, Error> {
		// A simple bind without password is an unauthenticated bind, which
		// servers report as success.
		if credential.is_empty() {
			debug!("Refusing to verify an empty credential for {dn}");
			return Ok(Verification::InvalidCredential);
		}

		let verification = match connection.simple_bind(dn, credential).await {
			Ok(()) => Ok(Verification::Verified),
			Err(Error::Bind { code: INVALID_CREDENTIALS, .. }) => Ok(Verification::InvalidCredential),
			Err(err @ Error::Bind { .. }) => Err(err),
			Err(err) => return Err(err),
		};
		debug!("Credential check for {dn}: {verification:?}");

		if let Err(source) = self.bind_service(connection).await {
			return match verification {
				Ok(outcome) => {
					Err(Error::Rebind { outcome, record: None, source: Box::new(source) })
				}
				Err(err) => Err(err),
			};
		}
		verification
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use mockall::{predicate::eq, Sequence};

	use super::{Authenticator, Verification};
	use crate::{config::Config, error::Error, session::MockDirectoryConnection};

	const SERVICE_DN: &str = "CN=read-only-admin,DC=example,DC=com";
	const SERVICE_PASSWORD: &str = "read-only-admin";
	const USER_DN: &str = "CN=Alice,OU=Users,DC=example,DC=com";

	fn rejected(dn: &str, code: u32) -> Error {
		Error::Bind { dn: dn.to_owned(), code, message: "80090308: LdapErr".to_owned() }
	}

	/// Expect a bind as the user answered by `user_bind`, followed by the
	/// rebind as the service identity answered by `rebind`.
	fn expect_user_then_service(
		connection: &mut MockDirectoryConnection,
		user_bind: Result<(), Error>,
		rebind: Result<(), Error>,
	) {
		let mut sequence = Sequence::new();
		connection
			.expect_simple_bind()
			.with(eq(USER_DN), eq("password"))
			.times(1)
			.in_sequence(&mut sequence)
			.return_once(move |_, _| user_bind);
		connection
			.expect_simple_bind()
			.with(eq(SERVICE_DN), eq(SERVICE_PASSWORD))
			.times(1)
			.in_sequence(&mut sequence)
			.return_once(move |_, _| rebind);
	}

	#[tokio::test]
	async fn service_bind_uses_configured_identity() {
		let config = Config::example();
		let mut connection = MockDirectoryConnection::new();
		connection
			.expect_simple_bind()
			.with(eq(SERVICE_DN), eq(SERVICE_PASSWORD))
			.times(1)
			.returning(|_, _| Ok(()));

		Authenticator::new(&config).bind_service(&mut connection).await.unwrap();
	}

	#[tokio::test]
	async fn service_bind_without_identity_is_anonymous() {
		let mut config = Config::example();
		config.bind_password = None;
		let mut connection = MockDirectoryConnection::new();
		connection.expect_simple_bind().never();

		Authenticator::new(&config).bind_service(&mut connection).await.unwrap();
	}

	#[tokio::test]
	async fn service_bind_rejected() {
		let config = Config::example();
		let mut connection = MockDirectoryConnection::new();
		connection.expect_simple_bind().returning(|dn, _| Err(rejected(dn, 49)));

		let result = Authenticator::new(&config).bind_service(&mut connection).await;
		assert!(matches!(result, Err(Error::Bind { code: 49, .. })));
	}

	#[tokio::test]
	async fn verified_then_rebound() {
		let config = Config::example();
		let mut connection = MockDirectoryConnection::new();
		expect_user_then_service(&mut connection, Ok(()), Ok(()));

		let verification = Authenticator::new(&config)
			.verify_credential(&mut connection, USER_DN, "password")
			.await
			.unwrap();
		assert_eq!(verification, Verification::Verified);
	}

	#[tokio::test]
	async fn rejected_then_rebound() {
		let config = Config::example();
		let mut connection = MockDirectoryConnection::new();
		expect_user_then_service(&mut connection, Err(rejected(USER_DN, 49)), Ok(()));

		let verification = Authenticator::new(&config)
			.verify_credential(&mut connection, USER_DN, "password")
			.await
			.unwrap();
		assert_eq!(verification, Verification::InvalidCredential);
	}

	#[tokio::test]
	async fn rebind_failure_keeps_outcome() {
		let config = Config::example();
		let mut connection = MockDirectoryConnection::new();
		expect_user_then_service(&mut connection, Ok(()), Err(rejected(SERVICE_DN, 49)));

		let result = Authenticator::new(&config)
			.verify_credential(&mut connection, USER_DN, "password")
			.await;
		match result {
			Err(Error::Rebind { outcome, record, source }) => {
				assert_eq!(outcome, Verification::Verified);
				assert!(record.is_none());
				assert_eq!(source.result_code(), Some(49));
			}
			other => panic!("Expected a rebind failure, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn other_bind_failure_is_an_error() {
		let config = Config::example();
		let mut connection = MockDirectoryConnection::new();
		expect_user_then_service(&mut connection, Err(rejected(USER_DN, 53)), Ok(()));

		let result = Authenticator::new(&config)
			.verify_credential(&mut connection, USER_DN, "password")
			.await;
		assert!(matches!(result, Err(Error::Bind { code: 53, .. })));
	}

	#[tokio::test]
	async fn transport_failure_is_not_a_rejection() {
		let config = Config::example();
		let mut connection = MockDirectoryConnection::new();
		connection.expect_simple_bind().times(1).returning(|_, _| Err(Error::Timeout));

		let result = Authenticator::new(&config)
			.verify_credential(&mut connection, USER_DN, "password")
			.await;
		assert!(matches!(result, Err(Error::Timeout)));
	}

	#[tokio::test]
	async fn anonymous_verification_skips_rebind() {
		let mut config = Config::example();
		config.bind_dn = String::new();
		let mut connection = MockDirectoryConnection::new();
		connection
			.expect_simple_bind()
			.with(eq(USER_DN), eq("password"))
			.times(1)
			.returning(|_, _| Ok(()));

		let verification = Authenticator::new(&config)
			.verify_credential(&mut connection, USER_DN, "password")
			.await
			.unwrap();
		assert_eq!(verification, Verification::Verified);
	}

	#[tokio::test]
	async fn empty_credential_is_rejected_locally() {
		let config = Config::example();
		let mut connection = MockDirectoryConnection::new();
		connection.expect_simple_bind().never();

		let verification =
			Authenticator::new(&config).verify_credential(&mut connection, USER_DN, "").await.unwrap();
		assert_eq!(verification, Verification::InvalidCredential);
	}
}
