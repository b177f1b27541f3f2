//! Query and authenticate against Active Directory over LDAP.
//!
//! An [`AdClient`] holds a single connection to a directory server. Every
//! operation connects if there is no usable connection, binds as the
//! configured service account, searches below the configured base and
//! normalizes the found entries into [`Record`]s: most attributes are reduced
//! to their first value, the attributes in [`record::MULTI_VALUED`] keep all
//! of them, and group memberships are reduced to the group names.
//!
//! Credentials are checked by looking the user up and binding as the found
//! entry. The connection is bound as the service account again afterwards,
//! so it never stays authenticated as the end user.
//!
//! For a general primer on LDAP, the [introduction] in the `ldap3` crate which
//! is used here for interfacing with LDAP is an excellent resource.
//!
//! [introduction]: https://github.com/inejge/ldap3/blob/master/LDAP-primer.md
//!
//! # Getting started
//! A minimal example of using the client might look like so:
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use ad_client::{AdClient, Authentication, Config};
//!
//! // Configuration is usually deserialized with serde. Fields left out get
//! // defaults, e.g. the user filter `(userPrincipalName=%s)`.
//! let config: Config = serde_json::from_str(
//! 	r#"{
//! 		"host": "dc1.dc.local",
//! 		"base": "dc=dc,dc=local",
//! 		"bind_dn": "CN=read-only-admin,DC=dc,DC=local",
//! 		"bind_password": "read-only-admin",
//! 		"attributes": ["userPrincipalName", "cn", "mail", "memberOf"]
//! 	}"#,
//! )?;
//!
//! let mut client = AdClient::new(config)?;
//! for user in client.fetch_users().await? {
//! 	println!("{}: {:?}", user.dn, user.list("memberOf"));
//! }
//!
//! match client.authenticate("alice@dc.local", "hunter2").await? {
//! 	Authentication::Authenticated(user) => println!("Welcome {:?}", user.scalar("cn")),
//! 	Authentication::InvalidCredential(user) => println!("Wrong password for {}", user.dn),
//! 	Authentication::NotFound => println!("No such user"),
//! }
//! client.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//! * A client is not meant to be shared between concurrent callers, all
//!   operations take `&mut self`. Use one client per caller.
//! * Nothing is retried. Failures are returned to the caller immediately.
//! * Binary attributes (e.g. `objectGUID`) are not part of [`Record`]s.
//! * Raw filters passed to [`AdClient::fetch_entries`] are used verbatim; only
//!   values substituted into a [`FilterTemplate`] are escaped.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod query;
pub mod record;
pub mod session;
mod tls;

pub use ldap3::{self, SearchEntry};

pub use crate::{
	auth::{Authenticator, Verification},
	client::{AdClient, Authentication},
	config::{Config, ConnectionConfig, TLSConfig},
	error::Error,
	query::{FilterTemplate, SearchRequest},
	record::{AttributeValue, Record},
	session::{Connector, DirectoryConnection, LdapConnector, Session},
};
