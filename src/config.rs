//! Config for the directory client.
use std::{
	io::BufReader,
	path::{Path, PathBuf},
	sync::Arc,
	time::Duration,
};

use ldap3::LdapConnSettings;
use rustls::{
	client::{ServerCertVerifier, WebPkiVerifier},
	Certificate, ClientConfig, PrivateKey, RootCertStore,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use crate::{
	error::Error,
	query::FilterTemplate,
	tls::{ExpectedNameVerifier, NoVerification},
};

/// Directory client configuration. Immutable for the lifetime of a client.
#[derive(Deserialize, Debug)]
pub struct Config {
	/// Host name or address of the directory server
	pub host: String,
	/// Port of the directory server
	#[serde(default = "default_port")]
	pub port: u16,
	/// Search base for all lookups, e.g. `dc=example,dc=com`
	pub base: String,
	/// Distinguished name of the service account. Leave empty for anonymous
	/// access.
	#[serde(default)]
	pub bind_dn: String,
	/// Password of the service account
	#[serde(default)]
	pub bind_password: Option<SecretString>,
	/// Filter used to look up a single user, `%s` is replaced by the escaped
	/// identity
	#[serde(default = "default_user_filter")]
	pub user_filter: FilterTemplate,
	/// Filter used to look up the members of a group, `%s` is replaced by the
	/// escaped group name
	#[serde(default = "default_group_filter")]
	pub group_filter: FilterTemplate,
	/// Attributes requested when the caller does not ask for specific ones.
	/// Empty means all user attributes.
	#[serde(default)]
	pub attributes: Vec<String>,
	/// Connection settings.
	#[serde(default)]
	pub connection: ConnectionConfig,
}

/// Configuration for how to connect to the LDAP server
#[derive(Clone, Debug, Deserialize)]
pub struct ConnectionConfig {
	/// Timeout to establish a connection in seconds.
	#[serde(default = "default_timeout")]
	pub timeout: u64,

	/// Timeout in seconds for a single bind or search. Unlimited if unset.
	#[serde(default)]
	pub operation_timeout: Option<u64>,

	/// TLS config
	#[serde(default)]
	pub tls: TLSConfig,
}

/// TLS Configuration
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct TLSConfig {
	/// Use TLS on a dedicated port (`ldaps`) rather than a plain connection
	pub use_ssl: bool,

	/// Do not upgrade a plain connection with the StartTLS extended operation.
	/// Has no effect together with `use_ssl`.
	pub skip_tls: bool,

	/// Disable verification of TLS certificates
	pub no_tls_verify: bool,

	/// Name the server certificate must be valid for, if it differs from
	/// the host connected to
	pub server_name: Option<String>,

	/// Additional TLS root certificates path
	pub root_certificates_path: Option<PathBuf>,

	/// Path of the TLS client key to use for the connection
	pub client_key_path: Option<PathBuf>,

	/// Path of the TLS client certificate chain to use for the connection
	pub client_certificate_path: Option<PathBuf>,
}

/// Default port for plain and StartTLS connections.
fn default_port() -> u16 {
	389
}

/// Default connection timeout in seconds.
fn default_timeout() -> u64 {
	5
}

/// Look users up by their user principal name.
fn default_user_filter() -> FilterTemplate {
	FilterTemplate::new("(userPrincipalName=%s)")
}

/// Look group members up through their `memberOf` back-link.
fn default_group_filter() -> FilterTemplate {
	FilterTemplate::new("(memberOf=%s)")
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		Self { timeout: default_timeout(), operation_timeout: None, tls: TLSConfig::default() }
	}
}

impl Config {
	/// The URL to connect to. `ldaps` when direct TLS is configured, `ldap`
	/// otherwise.
	pub fn url(&self) -> Result<Url, Error> {
		let scheme = if self.connection.tls.use_ssl { "ldaps" } else { "ldap" };
		let host = if self.host.contains(':') && !self.host.starts_with('[') {
			format!("[{}]", self.host)
		} else {
			self.host.clone()
		};
		Url::parse(&format!("{scheme}://{host}:{}", self.port))
			.map_err(|err| Error::Invalid(format!("Invalid host `{}`: {err}", self.host)))
	}

	/// The service identity and its password, if both are set.
	#[must_use]
	pub fn service_identity(&self) -> Option<(&str, &str)> {
		let password = self.bind_password.as_ref().map(ExposeSecret::expose_secret)?;
		(!self.bind_dn.is_empty() && !password.is_empty())
			.then_some((self.bind_dn.as_str(), password))
	}

	/// Returns the list of attributes the server should return: the requested
	/// ones, else the configured defaults, else all user attributes.
	#[must_use]
	pub fn attribute_list(&self, requested: &[String]) -> Vec<String> {
		if !requested.is_empty() {
			requested.to_vec()
		} else if !self.attributes.is_empty() {
			self.attributes.clone()
		} else {
			vec!["*".to_owned()]
		}
	}

	/// Returns an example configuration
	#[allow(dead_code)]
	pub(crate) fn example() -> Self {
		Config {
			host: "dc1.example.com".to_owned(),
			port: 389,
			base: "dc=example,dc=com".to_owned(),
			bind_dn: "CN=read-only-admin,DC=example,DC=com".to_owned(),
			bind_password: Some(SecretString::from("read-only-admin".to_owned())),
			user_filter: default_user_filter(),
			group_filter: default_group_filter(),
			attributes: vec![
				"userPrincipalName".to_owned(),
				"cn".to_owned(),
				"mail".to_owned(),
				"memberOf".to_owned(),
			],
			connection: ConnectionConfig::default(),
		}
	}
}

impl ConnectionConfig {
	/// Create a [`LdapConnSettings`] based on this [`ConnectionConfig`],
	/// using `tls_config` as built by [`TLSConfig::rustls_config`].
	pub(crate) fn to_settings(&self, tls_config: Option<Arc<ClientConfig>>) -> LdapConnSettings {
		let mut settings = LdapConnSettings::new();

		settings = settings.set_conn_timeout(Duration::from_secs(self.timeout));
		settings = settings.set_starttls(self.tls.upgrades());
		settings = settings.set_no_tls_verify(self.tls.no_tls_verify);

		if let Some(tls_config) = tls_config {
			settings = settings.set_config(tls_config);
		}
		settings
	}

	/// The per-operation timeout, if one is configured.
	#[must_use]
	pub fn operation_timeout(&self) -> Option<Duration> {
		self.operation_timeout.map(Duration::from_secs)
	}
}

impl TLSConfig {
	/// Whether a plain connection gets upgraded with StartTLS.
	#[must_use]
	pub fn upgrades(&self) -> bool {
		!self.use_ssl && !self.skip_tls
	}

	/// Whether TLS is negotiated at all.
	#[must_use]
	pub fn is_secure(&self) -> bool {
		self.use_ssl || !self.skip_tls
	}

	/// Whether the defaults of the LDAP library are insufficient and a
	/// rustls configuration has to be built.
	fn needs_client_config(&self) -> bool {
		self.is_secure()
			&& (self.server_name.is_some()
				|| self.root_certificates_path.is_some()
				|| self.client_certificate_path.is_some()
				|| self.client_key_path.is_some())
	}

	/// The rustls configuration to connect with, or `None` when the defaults
	/// of the LDAP library suffice.
	pub(crate) async fn rustls_config(&self) -> Result<Option<Arc<ClientConfig>>, Error> {
		if !self.needs_client_config() {
			return Ok(None);
		}
		Ok(Some(Arc::new(self.client_config().await?)))
	}

	/// Build the rustls configuration for this TLS config.
	pub(crate) async fn client_config(&self) -> Result<ClientConfig, Error> {
		let verifier: Arc<dyn ServerCertVerifier> = if self.no_tls_verify {
			Arc::new(NoVerification)
		} else {
			let roots = self.root_store().await?;
			match &self.server_name {
				Some(name) => Arc::new(ExpectedNameVerifier::new(roots, name)?),
				None => Arc::new(WebPkiVerifier::new(roots, None)),
			}
		};
		let builder =
			ClientConfig::builder().with_safe_defaults().with_custom_certificate_verifier(verifier);

		match (&self.client_key_path, &self.client_certificate_path) {
			(Some(key_path), Some(cert_path)) => {
				let chain = read_certificates(cert_path).await?;
				let key = read_private_key(key_path).await?;
				builder.with_client_auth_cert(chain, key).map_err(|err| {
					Error::Invalid(format!("Could not use client certificate: {err}"))
				})
			}
			(None, None) => Ok(builder.with_no_client_auth()),
			_ => Err(Error::Invalid(
				"Both a client certificate and key file in PEM format must be specified"
					.to_owned(),
			)),
		}
	}

	/// The platform's trusted roots plus the configured root certificates.
	async fn root_store(&self) -> Result<RootCertStore, Error> {
		let mut roots = RootCertStore::empty();
		match tokio::task::spawn_blocking(rustls_native_certs::load_native_certs).await {
			Ok(Ok(native)) => {
				let native: Vec<Vec<u8>> = native.into_iter().map(|cert| cert.0).collect();
				let (_added, ignored) = roots.add_parsable_certificates(&native);
				if ignored > 0 {
					tracing::debug!("Ignored {ignored} unparsable platform root certificates");
				}
			}
			Ok(Err(err)) => tracing::debug!("No platform root certificates available: {err}"),
			Err(err) => tracing::debug!("Loading platform root certificates failed: {err}"),
		}

		if let Some(path) = &self.root_certificates_path {
			for certificate in read_certificates(path).await? {
				roots.add(&certificate).map_err(|_| {
					Error::Invalid(format!("Could not read root certificate {}", path.display()))
				})?;
			}
		}
		Ok(roots)
	}
}

/// Read every certificate from a PEM file. A file without any is an error.
async fn read_certificates(path: &Path) -> Result<Vec<Certificate>, Error> {
	let pem = tokio::fs::read(path).await?;
	let certificates = rustls_pemfile::certs(&mut BufReader::new(pem.as_slice()))
		.map_err(|_| Error::Invalid(format!("Could not parse {}", path.display())))?;
	if certificates.is_empty() {
		return Err(Error::Invalid(format!("No certificates found in {}", path.display())));
	}
	Ok(certificates.into_iter().map(Certificate).collect())
}

/// Read the first PKCS#8, RSA or SEC1 private key from a PEM file.
async fn read_private_key(path: &Path) -> Result<PrivateKey, Error> {
	let pem = tokio::fs::read(path).await?;
	let items = rustls_pemfile::read_all(&mut BufReader::new(pem.as_slice()))
		.map_err(|_| Error::Invalid(format!("Could not parse {}", path.display())))?;
	items
		.into_iter()
		.find_map(|item| match item {
			rustls_pemfile::Item::PKCS8Key(key)
			| rustls_pemfile::Item::RSAKey(key)
			| rustls_pemfile::Item::ECKey(key) => Some(PrivateKey(key)),
			_ => None,
		})
		.ok_or_else(|| Error::Invalid(format!("No private key found in {}", path.display())))
}
