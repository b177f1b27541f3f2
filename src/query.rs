//! Search filters and requests.
use std::fmt;

use ldap3::{ldap_escape, SearchEntry};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::Error, session::DirectoryConnection};

/// Enabled user accounts, excluding computer and group objects.
pub const USERS_FILTER: &str = "(&(|(objectClass=user)(objectClass=person))\
	(!(userAccountControl:1.2.840.113556.1.4.803:=2))\
	(!(objectClass=computer))(!(objectClass=group)))";

/// Computer accounts.
pub const COMPUTERS_FILTER: &str = "(objectClass=computer)";

/// A search filter with a substitution slot (`%s`) for a single value, e.g.
/// `(userPrincipalName=%s)`.
///
/// Values are escaped according to RFC 4515 before they are substituted, so
/// untrusted input can't change the structure of the filter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterTemplate(String);

impl FilterTemplate {
	/// The substitution slot
	pub const PLACEHOLDER: &'static str = "%s";

	/// Create a template. Every occurrence of [`Self::PLACEHOLDER`] gets
	/// replaced on rendering.
	#[must_use]
	pub fn new(template: impl Into<String>) -> Self {
		Self(template.into())
	}

	/// Substitute the escaped `value` into the template.
	#[must_use]
	pub fn render(&self, value: &str) -> String {
		self.0.replace(Self::PLACEHOLDER, &ldap_escape(value))
	}

	/// The template as configured
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for FilterTemplate {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// A whole-subtree search below a base entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchRequest {
	/// Distinguished name of the entry the search starts at
	pub base: String,
	/// The search filter
	pub filter: String,
	/// Attributes to return
	pub attributes: Vec<String>,
}

impl SearchRequest {
	/// Create a request returning all user attributes.
	#[must_use]
	pub fn new(base: impl Into<String>, filter: impl Into<String>) -> Self {
		Self { base: base.into(), filter: filter.into(), attributes: vec!["*".to_owned()] }
	}

	/// Only return the given attributes.
	#[must_use]
	pub fn with_attributes(mut self, attributes: Vec<String>) -> Self {
		self.attributes = attributes;
		self
	}
}

/// Issue `request` on `connection` and return every matched entry, in the
/// order the server sent them.
pub async fn search(
	connection: &mut dyn DirectoryConnection,
	request: &SearchRequest,
) -> Result<Vec<SearchEntry>, Error> {
	let entries = connection.search(&request.base, &request.filter, &request.attributes).await?;
	debug!("Search for {} below {} matched {} entries", request.filter, request.base, entries.len());
	Ok(entries)
}

/// Reduce a result set that has to consist of exactly one entry.
pub(crate) fn single(mut entries: Vec<SearchEntry>, filter: &str) -> Result<SearchEntry, Error> {
	match entries.len() {
		0 => Err(Error::NotFound { filter: filter.to_owned() }),
		1 => entries.pop().ok_or_else(|| Error::NotFound { filter: filter.to_owned() }),
		count => Err(Error::AmbiguousResult { filter: filter.to_owned(), count }),
	}
}
