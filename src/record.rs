//! Normalization of search results into records.
//!
//! Directory attributes are multi-valued at the protocol level, but most
//! attributes of a user or computer only ever hold one value. A [`Record`]
//! keeps the first value of such attributes, and the full list only for the
//! attributes in [`MULTI_VALUED`]. Group memberships are reduced to the name
//! of the group.
use std::collections::BTreeMap;

use ldap3::SearchEntry;
use serde::Serialize;

/// The group membership attribute
pub const MEMBER_OF: &str = "memberOf";

/// Attributes which keep all of their values
pub const MULTI_VALUED: [&str; 4] = [MEMBER_OF, "url", "otherTelephone", "proxyAddresses"];

/// Length of the `CN=` attribute type prefix stripped from group DNs
const RDN_PREFIX_LEN: usize = 3;

/// Value of an attribute in a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
	/// The first value of a single-valued attribute
	Scalar(String),
	/// All values of a multi-valued attribute, in server order
	List(Vec<String>),
}

impl AttributeValue {
	/// The value of a scalar attribute.
	#[must_use]
	pub fn as_scalar(&self) -> Option<&str> {
		match self {
			AttributeValue::Scalar(value) => Some(value),
			AttributeValue::List(_) => None,
		}
	}

	/// The values of a multi-valued attribute.
	#[must_use]
	pub fn as_list(&self) -> Option<&[String]> {
		match self {
			AttributeValue::Scalar(_) => None,
			AttributeValue::List(values) => Some(values),
		}
	}
}

/// A directory entry in the shape callers consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
	/// Distinguished name of the entry
	pub dn: String,
	/// Attribute name to value
	#[serde(flatten)]
	pub attributes: BTreeMap<String, AttributeValue>,
}

impl Record {
	/// Look an attribute up. Attribute names are case-insensitive.
	#[must_use]
	pub fn get(&self, attribute: &str) -> Option<&AttributeValue> {
		self.attributes.get(attribute).or_else(|| {
			self.attributes
				.iter()
				.find(|(name, _)| name.eq_ignore_ascii_case(attribute))
				.map(|(_, value)| value)
		})
	}

	/// The value of a scalar attribute.
	#[must_use]
	pub fn scalar(&self, attribute: &str) -> Option<&str> {
		self.get(attribute).and_then(AttributeValue::as_scalar)
	}

	/// The values of a multi-valued attribute.
	#[must_use]
	pub fn list(&self, attribute: &str) -> Option<&[String]> {
		self.get(attribute).and_then(AttributeValue::as_list)
	}
}

/// Whether `attribute` keeps all of its values.
#[must_use]
pub fn is_multi_valued(attribute: &str) -> bool {
	MULTI_VALUED.iter().any(|name| name.eq_ignore_ascii_case(attribute))
}

/// Convert a search result entry into a [`Record`].
///
/// Attributes without values are dropped, binary attributes are not
/// represented.
#[must_use]
pub fn normalize(entry: SearchEntry) -> Record {
	let attributes = entry
		.attrs
		.into_iter()
		.filter_map(|(name, values)| {
			if values.is_empty() {
				return None;
			}
			let value = if name.eq_ignore_ascii_case(MEMBER_OF) {
				AttributeValue::List(values.iter().map(|dn| group_name(dn).to_owned()).collect())
			} else if is_multi_valued(&name) {
				AttributeValue::List(values)
			} else {
				AttributeValue::Scalar(values.into_iter().next()?)
			};
			Some((name, value))
		})
		.collect();
	Record { dn: entry.dn, attributes }
}

/// The group name in a group membership value.
///
/// `CN=Admins,OU=Groups,DC=example,DC=com` yields `Admins`: the value of the
/// first component, assuming a three character `CN=` prefix. A value without
/// a component separator is returned as is.
#[must_use]
pub fn group_name(dn: &str) -> &str {
	match first_component(dn) {
		Some(component) => component.get(RDN_PREFIX_LEN..).unwrap_or(component),
		None => dn,
	}
}

/// The part of `dn` before the first unescaped `,`, if there is one.
fn first_component(dn: &str) -> Option<&str> {
	let mut escaped = false;
	for (index, character) in dn.char_indices() {
		match character {
			'\\' if !escaped => escaped = true,
			',' if !escaped => return Some(&dn[..index]),
			_ => escaped = false,
		}
	}
	None
}
