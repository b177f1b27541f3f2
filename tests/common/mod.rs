use std::error::Error;

use ad_client::{Config, ConnectionConfig, FilterTemplate};
use ldap3::LdapConnAsync;
use secrecy::SecretString;

pub const BASE: &str = "dc=example,dc=org";
pub const ADMIN_DN: &str = "cn=admin,dc=example,dc=org";
pub const ADMIN_PASSWORD: &str = "adminpassword";

/// Client configuration for the test server. Users are looked up by `uid`,
/// group members by `businessCategory`. The server speaks plain LDAP.
#[must_use]
pub fn config() -> Config {
	let mut connection = ConnectionConfig::default();
	connection.tls.skip_tls = true;

	Config {
		host: "localhost".to_owned(),
		port: 1389,
		base: BASE.to_owned(),
		bind_dn: ADMIN_DN.to_owned(),
		bind_password: Some(SecretString::from(ADMIN_PASSWORD.to_owned())),
		user_filter: FilterTemplate::new("(uid=%s)"),
		group_filter: FilterTemplate::new("(businessCategory=%s)"),
		attributes: vec![
			"uid".to_owned(),
			"cn".to_owned(),
			"mail".to_owned(),
			"businessCategory".to_owned(),
		],
		connection,
	}
}

pub async fn ldap_add_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.add(
		&format!("ou={},{BASE}", ou),
		vec![("objectClass", ["organizationalUnit"].into())],
	)
	.await?
	.success()?;
	Ok(())
}

pub async fn ldap_delete_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.delete(&format!("ou={},{BASE}", ou)).await?.success()?;
	Ok(())
}

pub async fn ldap_connect() -> Result<ldap3::Ldap, Box<dyn Error>> {
	let (conn, mut ldap) = LdapConnAsync::new("ldap://localhost:1389").await?;
	let _handle = tokio::spawn(async move {
		if let Err(err) = conn.drive().await {
			panic!("Ldap connection error {err}");
		}
	});
	ldap.simple_bind(ADMIN_DN, ADMIN_PASSWORD).await?.success()?;
	Ok(ldap)
}

pub async fn ldap_delete_user(ldap: &mut ldap3::Ldap, uid: &str) -> Result<(), Box<dyn Error>> {
	ldap.delete(&format!("uid={},ou=users,{BASE}", uid)).await?.success()?;
	Ok(())
}

pub async fn ldap_add_user(
	ldap: &mut ldap3::Ldap,
	uid: &str,
	cn: &str,
	password: &str,
	category: &str,
) -> Result<(), Box<dyn Error>> {
	let mail = format!("{uid}@example.org");
	ldap.add(
		&format!("uid={},ou=users,{BASE}", uid),
		vec![
			("objectClass", ["inetOrgPerson"].into()),
			("uid", [uid].into()),
			("cn", [cn].into()),
			("sn", [cn].into()),
			("mail", [mail.as_str()].into()),
			("businessCategory", [category].into()),
			("userPassword", [password].into()),
		],
	)
	.await?
	.success()?;
	Ok(())
}

/// Recreate `ou=users` with the given `(uid, cn, password, category)` users.
pub async fn ldap_populate(
	ldap: &mut ldap3::Ldap,
	users: &[(&str, &str, &str, &str)],
) -> Result<(), Box<dyn Error>> {
	ldap_clear(ldap, users).await;
	ldap_add_organizational_unit(ldap, "users").await?;
	for (uid, cn, password, category) in users {
		ldap_add_user(ldap, uid, cn, password, category).await?;
	}
	Ok(())
}

/// Remove the given users and `ou=users`, ignoring entries that don't exist.
pub async fn ldap_clear(ldap: &mut ldap3::Ldap, users: &[(&str, &str, &str, &str)]) {
	for (uid, ..) in users {
		let _ = ldap_delete_user(ldap, uid).await;
	}
	let _ = ldap_delete_organizational_unit(ldap, "users").await;
}
