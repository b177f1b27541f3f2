//! Connection lifecycle.
//!
//! A [`Session`] owns at most one connection to the directory server. It is
//! established lazily by [`Session::ensure_connected`], replaced when the
//! server or the transport closed it, and released by [`Session::close`].
//! The network side is abstracted by [`Connector`] and
//! [`DirectoryConnection`], with [`LdapConnector`] as the implementation on
//! top of `ldap3`.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use ldap3::{DerefAliases, LdapConnAsync, LdapError, Scope, SearchEntry, SearchOptions};
use rustls::ClientConfig;
use tokio::sync::OnceCell;
use tracing::{debug, trace, warn};
use url::Url;

use crate::{
	config::{Config, ConnectionConfig},
	error::Error,
};

/// A live connection to a directory server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryConnection: Send {
	/// Whether the connection is closing or closed. Must not cause a round
	/// trip to the server.
	fn is_closed(&mut self) -> bool;

	/// Perform a simple bind. A bind the server rejects is reported as
	/// [`Error::Bind`] carrying the LDAP result code.
	async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<(), Error>;

	/// Search the whole subtree below `base` without dereferencing aliases
	/// and without size or time limit. A search the server rejects is
	/// reported as [`Error::Query`].
	async fn search(
		&mut self,
		base: &str,
		filter: &str,
		attributes: &[String],
	) -> Result<Vec<SearchEntry>, Error>;

	/// Unbind and terminate the connection.
	async fn unbind(&mut self) -> Result<(), Error>;
}

/// Establishes connections to a directory server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
	/// Open a new connection, negotiating TLS as configured. Fails with
	/// [`Error::Connection`] if the server can't be reached or the
	/// negotiation fails.
	async fn connect(&self) -> Result<Box<dyn DirectoryConnection>, Error>;
}

/// [`Connector`] for real directory servers, backed by `ldap3`.
#[derive(Debug, Clone)]
pub struct LdapConnector {
	/// Where to connect to. The scheme selects direct TLS.
	url: Url,
	/// Timeouts and TLS settings
	connection: ConnectionConfig,
	/// TLS material, read from disk on the first connect
	tls_config: OnceCell<Option<Arc<ClientConfig>>>,
}

impl LdapConnector {
	/// Create a connector for the server described by `config`.
	pub fn new(config: &Config) -> Result<Self, Error> {
		Ok(Self {
			url: config.url()?,
			connection: config.connection.clone(),
			tls_config: OnceCell::new(),
		})
	}
}

#[async_trait]
impl Connector for LdapConnector {
	async fn connect(&self) -> Result<Box<dyn DirectoryConnection>, Error> {
		let tls_config =
			self.tls_config.get_or_try_init(|| self.connection.tls.rustls_config()).await?;
		let settings = self.connection.to_settings(tls_config.clone());
		debug!(
			"Connecting to {} ({})",
			self.url,
			if self.connection.tls.upgrades() { "StartTLS" } else { "no upgrade" }
		);
		let (conn, ldap) = LdapConnAsync::from_url_with_settings(settings, &self.url)
			.await
			.map_err(|source| Error::Connection { url: self.url.to_string(), source })?;
		tokio::spawn(async move {
			if let Err(err) = conn.drive().await {
				warn!("Ldap connection error {err}");
			}
		});

		let operation_timeout = self.connection.operation_timeout();
		Ok(Box::new(LdapConnection { ldap, operation_timeout }))
	}
}

/// A connection established by [`LdapConnector`].
struct LdapConnection {
	/// Handle for issuing operations
	ldap: ldap3::Ldap,
	/// Applied to every bind and search
	operation_timeout: Option<Duration>,
}

impl LdapConnection {
	/// The handle, with the operation timeout armed for the next operation.
	fn handle(&mut self) -> &mut ldap3::Ldap {
		if let Some(timeout) = self.operation_timeout {
			self.ldap.with_timeout(timeout);
		}
		&mut self.ldap
	}
}

/// Separate operation timeouts from other protocol failures.
fn map_ldap_error(err: LdapError) -> Error {
	match err {
		LdapError::Timeout { .. } => Error::Timeout,
		err => Error::Ldap(err),
	}
}

#[async_trait]
impl DirectoryConnection for LdapConnection {
	fn is_closed(&mut self) -> bool {
		self.ldap.is_closed()
	}

	async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<(), Error> {
		let result = self.handle().simple_bind(dn, password).await.map_err(map_ldap_error)?;
		if result.rc != 0 {
			return Err(Error::Bind {
				dn: dn.to_owned(),
				code: result.rc,
				message: result.text,
			});
		}
		trace!("Bound as {dn}");
		Ok(())
	}

	async fn search(
		&mut self,
		base: &str,
		filter: &str,
		attributes: &[String],
	) -> Result<Vec<SearchEntry>, Error> {
		let options = SearchOptions::new().deref(DerefAliases::Never).sizelimit(0).timelimit(0);
		let ldap3::SearchResult(entries, result) = self
			.handle()
			.with_search_options(options)
			.search(base, Scope::Subtree, filter, attributes)
			.await
			.map_err(map_ldap_error)?;
		if result.rc != 0 {
			return Err(Error::Query {
				filter: filter.to_owned(),
				code: result.rc,
				message: result.text,
			});
		}
		Ok(entries.into_iter().map(SearchEntry::construct).collect())
	}

	async fn unbind(&mut self) -> Result<(), Error> {
		self.ldap.unbind().await.map_err(map_ldap_error)
	}
}

/// Owner of the single connection of a client.
pub struct Session {
	/// Opens new connections
	connector: Box<dyn Connector>,
	/// The current connection, if any
	connection: Option<Box<dyn DirectoryConnection>>,
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session").field("connected", &self.connection.is_some()).finish()
	}
}

impl Session {
	/// Create a session without connecting.
	#[must_use]
	pub fn new(connector: Box<dyn Connector>) -> Self {
		Self { connector, connection: None }
	}

	/// Return the live connection, connecting first if there is none or the
	/// current one is closing or closed.
	///
	/// On failure no connection is kept.
	pub async fn ensure_connected(&mut self) -> Result<&mut dyn DirectoryConnection, Error> {
		let connection = match self.connection.take() {
			Some(mut connection) => {
				if connection.is_closed() {
					debug!("Connection was closed, reconnecting");
					self.connector.connect().await?
				} else {
					connection
				}
			}
			None => self.connector.connect().await?,
		};
		Ok(&mut **self.connection.insert(connection))
	}

	/// Whether a connection that hasn't been closed is held.
	pub fn is_connected(&mut self) -> bool {
		self.connection.as_mut().is_some_and(|connection| !connection.is_closed())
	}

	/// Terminate the connection, if there is one. Safe to call repeatedly.
	pub async fn close(&mut self) {
		if let Some(mut connection) = self.connection.take() {
			if let Err(err) = connection.unbind().await {
				debug!("Unbind while closing failed: {err}");
			}
		}
	}
}
