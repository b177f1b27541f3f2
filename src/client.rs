//! Client for querying and authenticating against Active Directory

use ldap3::SearchEntry;
use tracing::debug;

use crate::{
	auth::{Authenticator, Verification},
	config::Config,
	error::Error,
	query::{self, SearchRequest, COMPUTERS_FILTER, USERS_FILTER},
	record::{normalize, Record},
	session::{Connector, LdapConnector, Session},
};

/// Outcome of [`AdClient::authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
	/// The credential is valid for the user.
	Authenticated(Record),
	/// No entry matches the identity. No credential check was attempted.
	NotFound,
	/// The user exists, but the credential was rejected.
	InvalidCredential(Record),
}

impl Authentication {
	/// Whether the credential was accepted.
	#[must_use]
	pub fn is_authenticated(&self) -> bool {
		matches!(self, Authentication::Authenticated(_))
	}

	/// The user the identity resolved to, if it resolved to one.
	#[must_use]
	pub fn record(&self) -> Option<&Record> {
		match self {
			Authentication::Authenticated(record) | Authentication::InvalidCredential(record) => {
				Some(record)
			}
			Authentication::NotFound => None,
		}
	}
}

/// Holds the configuration and the connection, and provides the operations
/// against the directory.
///
/// Each operation connects if needed, binds as the service identity, searches
/// and normalizes the results. A client is meant for one caller at a time;
/// use one client per concurrent caller. Call [`AdClient::close`] when done.
#[derive(Debug)]
pub struct AdClient {
	/// The configuration of the client.
	config: Config,
	/// The connection to the directory server
	session: Session,
}

impl AdClient {
	/// Create a client for the server described by `config`. Does not
	/// connect yet.
	pub fn new(config: Config) -> Result<Self, Error> {
		let connector = LdapConnector::new(&config)?;
		Ok(Self::with_connector(config, Box::new(connector)))
	}

	/// Create a client establishing its connections with `connector`.
	#[must_use]
	pub fn with_connector(config: Config, connector: Box<dyn Connector>) -> Self {
		Self { config, session: Session::new(connector) }
	}

	/// The configuration of the client.
	#[must_use]
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// All entries below `base` matching `filter`. An empty filter selects
	/// enabled user accounts.
	pub async fn fetch_entries(&mut self, base: &str, filter: &str) -> Result<Vec<Record>, Error> {
		let filter = if filter.is_empty() { USERS_FILTER } else { filter };
		let entries = self.search(self.request(base, filter)).await?;
		Ok(entries.into_iter().map(normalize).collect())
	}

	/// All enabled user accounts below the configured base.
	pub async fn fetch_users(&mut self) -> Result<Vec<Record>, Error> {
		let base = self.config.base.clone();
		self.fetch_users_in(&base).await
	}

	/// All enabled user accounts below `base`.
	pub async fn fetch_users_in(&mut self, base: &str) -> Result<Vec<Record>, Error> {
		self.fetch_entries(base, USERS_FILTER).await
	}

	/// All computer accounts below the configured base.
	pub async fn fetch_computers(&mut self) -> Result<Vec<Record>, Error> {
		let base = self.config.base.clone();
		self.fetch_entries(&base, COMPUTERS_FILTER).await
	}

	/// All members of `group`, found with the configured group filter.
	pub async fn fetch_group_members(&mut self, group: &str) -> Result<Vec<Record>, Error> {
		let filter = self.config.group_filter.render(group);
		let base = self.config.base.clone();
		self.fetch_entries(&base, &filter).await
	}

	/// The single user matching `identity` with the configured user filter.
	///
	/// Fails with [`Error::NotFound`] if no user matches and with
	/// [`Error::AmbiguousResult`] if more than one does.
	pub async fn fetch_user(&mut self, identity: &str) -> Result<Record, Error> {
		let request = self.user_request(identity);
		let entries = self.search(request.clone()).await?;
		query::single(entries, &request.filter).map(normalize)
	}

	/// Check `credential` for the user matching `identity`.
	///
	/// Unknown identities and rejected credentials are outcomes, not errors.
	/// Fails with [`Error::AmbiguousResult`] if more than one user matches
	/// and with [`Error::Rebind`] if the connection could not be bound as
	/// the service identity again after the check. That error still carries
	/// the outcome of the check and the user's record.
	pub async fn authenticate(
		&mut self,
		identity: &str,
		credential: &str,
	) -> Result<Authentication, Error> {
		let request = self.user_request(identity);
		let authenticator = Authenticator::new(&self.config);
		let connection = self.session.ensure_connected().await?;
		authenticator.bind_service(connection).await?;

		let entries = query::search(connection, &request).await?;
		let entry = match query::single(entries, &request.filter) {
			Ok(entry) => entry,
			Err(Error::NotFound { .. }) => {
				debug!("No user matches {identity}");
				return Ok(Authentication::NotFound);
			}
			Err(err) => return Err(err),
		};

		let checked = authenticator.verify_credential(connection, &entry.dn, credential).await;
		let verification = match checked {
			Ok(verification) => verification,
			Err(Error::Rebind { outcome, source, .. }) => {
				let record = Some(Box::new(normalize(entry)));
				return Err(Error::Rebind { outcome, record, source });
			}
			Err(err) => return Err(err),
		};
		let record = normalize(entry);
		Ok(match verification {
			Verification::Verified => Authentication::Authenticated(record),
			Verification::InvalidCredential => Authentication::InvalidCredential(record),
		})
	}

	/// Close the connection. The next operation reconnects.
	pub async fn close(&mut self) {
		self.session.close().await;
	}

	/// A search for the configured attributes.
	fn request(&self, base: &str, filter: &str) -> SearchRequest {
		SearchRequest::new(base, filter).with_attributes(self.config.attribute_list(&[]))
	}

	/// Look-up of a single user by `identity`.
	fn user_request(&self, identity: &str) -> SearchRequest {
		self.request(&self.config.base, &self.config.user_filter.render(identity))
	}

	/// Connect, bind as the service identity and search.
	async fn search(&mut self, request: SearchRequest) -> Result<Vec<SearchEntry>, Error> {
		let authenticator = Authenticator::new(&self.config);
		let connection = self.session.ensure_connected().await?;
		authenticator.bind_service(connection).await?;
		query::search(connection, &request).await
	}
}
