//! Error codes

use crate::{auth::Verification, record::Record};

/// Errors that can occur when using this library
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// The configuration or the TLS material it points to is unusable.
	#[error("Invalid configuration: {0}")]
	Invalid(String),
	/// Reading a file referenced by the configuration failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// Establishing the connection, including TLS negotiation, failed. Any
	/// previous connection has been discarded.
	#[error("Could not connect to {url}: {source}")]
	Connection {
		/// The URL the connection was attempted with
		url: String,
		/// The underlying failure
		#[source]
		source: ldap3::LdapError,
	},
	/// The server rejected a bind.
	#[error("Bind as `{dn}` rejected (rc={code}): {message}")]
	Bind {
		/// The identity the bind was attempted with
		dn: String,
		/// LDAP result code
		code: u32,
		/// Diagnostic message from the server
		message: String,
	},
	/// The server rejected a search, e.g. because of a malformed filter.
	#[error("Search for `{filter}` failed (rc={code}): {message}")]
	Query {
		/// The filter of the failed search
		filter: String,
		/// LDAP result code
		code: u32,
		/// Diagnostic message from the server
		message: String,
	},
	/// A single-result lookup matched no entry.
	#[error("No entry matches `{filter}`")]
	NotFound {
		/// The filter of the lookup
		filter: String,
	},
	/// A single-result lookup matched more than one entry.
	#[error("{count} entries match `{filter}`, expected exactly one")]
	AmbiguousResult {
		/// The filter of the lookup
		filter: String,
		/// How many entries matched
		count: usize,
	},
	/// Rebinding as the service identity after a credential check failed.
	/// The outcome of the credential check itself is preserved.
	#[error("Rebind as service identity failed after credential check: {source}")]
	Rebind {
		/// Result of the credential check that preceded the rebind
		outcome: Verification,
		/// The user the credential was checked for, when the check was part
		/// of [`AdClient::authenticate`](crate::AdClient::authenticate)
		record: Option<Box<Record>>,
		/// Why the rebind failed
		#[source]
		source: Box<Error>,
	},
	/// An operation did not complete within the configured operation timeout.
	#[error("Operation timed out")]
	Timeout,
	/// An underlying protocol error or similar occurred, or the LDAP library
	/// was used incorrectly.
	#[error(transparent)]
	Ldap(#[from] ldap3::LdapError),
}

impl Error {
	/// The LDAP result code carried by this error, if the server sent one.
	#[must_use]
	pub fn result_code(&self) -> Option<u32> {
		match self {
			Error::Bind { code, .. } | Error::Query { code, .. } => Some(*code),
			Error::Rebind { source, .. } => source.result_code(),
			_ => None,
		}
	}
}
