//! LDAP support.

use async_trait::async_trait;
use ldap3::{LdapConnAsync, Scope, SearchEntry};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{DirectoryReader, Selector, record_from_attributes};
use crate::error::ServiceError;
use crate::record::RawUserRecord;
use crate::shaper::AttributeRequest;

const DEFAULT_USERS_FILTER: &str = "(objectClass=person)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapConfig {
    pub addr: String,
    pub base_dn: String,
    pub users_filter: String,
    pub search_attributes: Vec<String>,
}

impl LdapConfig {
    /// Create a new [`LdapConfig`].
    pub fn new(
        addr: impl Into<String>,
        base_dn: impl Into<String>,
        users_filter: Option<&str>,
        search_attributes: Vec<String>,
    ) -> Self {
        let users_filter = match users_filter.map(str::trim) {
            Some(filter) if filter.starts_with('(') => filter.to_owned(),
            Some(filter) if !filter.is_empty() => format!("({filter})"),
            _ => DEFAULT_USERS_FILTER.to_owned(),
        };

        Self {
            addr: addr.into(),
            base_dn: base_dn.into(),
            users_filter,
            search_attributes,
        }
    }

    /// LDAP filter matching `selector`.
    pub fn filter(&self, selector: &Selector) -> String {
        match selector {
            Selector::All => self.users_filter.clone(),
            Selector::Search(_) if self.search_attributes.is_empty() => {
                warn!("no search attribute, search string ignored");
                self.users_filter.clone()
            },
            Selector::Search(search) => {
                let search = escape_ldap(search);
                let alternatives: String = self
                    .search_attributes
                    .iter()
                    .map(|attr| format!("({attr}=*{search}*)"))
                    .collect();

                format!("(&{}(|{alternatives}))", self.users_filter)
            },
        }
    }
}

/// Reads users from an LDAP directory.
#[derive(Debug)]
pub struct LdapDirectory {
    config: LdapConfig,
    bind: Option<(String, SecretString)>,
}

impl LdapDirectory {
    /// Create a new [`LdapDirectory`], anonymous when `bind` is `None`.
    pub fn new(
        config: LdapConfig,
        bind: Option<(String, SecretString)>,
    ) -> Self {
        Self { config, bind }
    }
}

#[async_trait]
impl DirectoryReader for LdapDirectory {
    #[instrument(skip(self, request), fields(addr = %self.config.addr))]
    async fn list_users(
        &self,
        selector: &Selector,
        request: &AttributeRequest,
    ) -> Result<Vec<RawUserRecord>, ServiceError> {
        let (handle, mut conn) = LdapConnAsync::new(&self.config.addr).await?;
        ldap3::drive!(handle);

        if let Some((dn, password)) = &self.bind {
            conn.simple_bind(dn, password.expose_secret())
                .await?
                .success()?;
        }

        let filter = self.config.filter(selector);
        debug!(%filter, base_dn = %self.config.base_dn, "searching users");

        let (entries, _) = conn
            .search(
                &self.config.base_dn,
                Scope::Subtree,
                &filter,
                request.directory_attributes(),
            )
            .await?
            .success()?;
        conn.unbind().await?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                entry_to_record(SearchEntry::construct(entry), request)
            })
            .collect())
    }
}

fn entry_to_record(
    entry: SearchEntry,
    request: &AttributeRequest,
) -> RawUserRecord {
    let attributes = entry.attrs.into_iter().filter_map(|(name, mut values)| {
        let value = match values.len() {
            0 => return None,
            1 => Value::String(values.remove(0)),
            _ => Value::Array(values.into_iter().map(Value::String).collect()),
        };
        Some((name, value))
    });

    record_from_attributes(attributes, request)
}

fn escape_ldap(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '*' => out.push_str(r"\2a"),
            '(' => out.push_str(r"\28"),
            ')' => out.push_str(r"\29"),
            '\\' => out.push_str(r"\5c"),
            '\0' => out.push_str(r"\00"),
            c => out.push(c),
        }
    }
    out
}
