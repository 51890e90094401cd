//! Keyspace DDL construction.
//!
//! Statements are built as a template with `?` markers plus an ordered
//! parameter list. User-supplied values never enter the template text; the
//! keyspace name, which CQL only accepts as an identifier, is written as a
//! quoted identifier with embedded quotes doubled.
//!
//! ```
//! use cassandra_keyspace_provider::model::DesiredState;
//! use cassandra_keyspace_provider::statement::{build, CqlParam, StatementKind};
//!
//! let statement = build(StatementKind::Create, &DesiredState::simple("orders", true, 3)).unwrap();
//! assert_eq!(
//!     statement.cql,
//!     "CREATE KEYSPACE IF NOT EXISTS \"orders\" WITH REPLICATION = { 'class' : ?, ? : ? } AND DURABLE_WRITES = ?"
//! );
//! assert_eq!(statement.option_pairs(), vec![("replication_factor", 3)]);
//! assert_eq!(statement.params.last(), Some(&CqlParam::Bool(true)));
//! ```

use std::fmt;

use crate::error::ProviderError;
use crate::model::DesiredState;

/// The administrative verb of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// `CREATE KEYSPACE IF NOT EXISTS`
    Create,
    /// `ALTER KEYSPACE`
    Alter,
    /// `DROP KEYSPACE`
    Drop,
}

impl StatementKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Create => "CREATE KEYSPACE IF NOT EXISTS",
            Self::Alter => "ALTER KEYSPACE",
            Self::Drop => "DROP KEYSPACE",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Create => "create",
            Self::Alter => "alter",
            Self::Drop => "drop",
        };
        f.write_str(verb)
    }
}

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CqlParam {
    /// A text literal.
    Text(String),
    /// An integer literal.
    Int(i64),
    /// A boolean literal.
    Bool(bool),
}

impl CqlParam {
    /// The CQL literal form of this value.
    pub fn to_literal(&self) -> String {
        match self {
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Int(i) => i.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

/// An administrative statement against one keyspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// The verb.
    pub kind: StatementKind,
    /// The keyspace the statement targets, unquoted.
    pub keyspace: String,
    /// Template text with `?` markers.
    pub cql: String,
    /// Parameters in marker order.
    pub params: Vec<CqlParam>,
}

impl Statement {
    /// The replication option pairs carried by a create or alter statement.
    ///
    /// Parameters are laid out as `class, (key, count)*, durable_writes`.
    pub fn option_pairs(&self) -> Vec<(&str, i64)> {
        if self.kind == StatementKind::Drop || self.params.len() < 2 {
            return Vec::new();
        }
        self.params[1..self.params.len() - 1]
            .chunks(2)
            .filter_map(|pair| match pair {
                [CqlParam::Text(key), CqlParam::Int(count)] => Some((key.as_str(), *count)),
                _ => None,
            })
            .collect()
    }

    /// The replication class parameter, if any.
    pub fn replication_class(&self) -> Option<&str> {
        match self.params.first() {
            Some(CqlParam::Text(class)) if self.kind != StatementKind::Drop => Some(class),
            _ => None,
        }
    }

    /// The durable writes parameter, if any.
    pub fn durable_writes(&self) -> Option<bool> {
        match self.params.last() {
            Some(CqlParam::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Substitute parameters into the template as CQL literals.
    ///
    /// Markers inside quoted identifiers are left alone.
    pub fn render(&self) -> Result<String, ProviderError> {
        let mut out = String::with_capacity(self.cql.len() + 16 * self.params.len());
        let mut params = self.params.iter();
        let mut in_identifier = false;

        for c in self.cql.chars() {
            match c {
                '"' => {
                    in_identifier = !in_identifier;
                    out.push(c);
                }
                '?' if !in_identifier => {
                    let param = params.next().ok_or_else(|| {
                        ProviderError::Sdk(format!(
                            "statement has more markers than its {} parameter(s)",
                            self.params.len()
                        ))
                    })?;
                    out.push_str(&param.to_literal());
                }
                _ => out.push(c),
            }
        }

        if params.next().is_some() {
            return Err(ProviderError::Sdk(format!(
                "statement has fewer markers than its {} parameter(s)",
                self.params.len()
            )));
        }
        Ok(out)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cql)
    }
}

/// Quote a CQL identifier, doubling embedded double quotes.
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Build a create or alter statement for the desired keyspace.
///
/// For [`StatementKind::Alter`] the caller passes the state whose name is
/// the keyspace's existing identity.
pub fn build(kind: StatementKind, desired: &DesiredState) -> Result<Statement, ProviderError> {
    if kind == StatementKind::Drop {
        return Err(ProviderError::Sdk(
            "drop statements are built with build_drop".to_string(),
        ));
    }
    desired.validate()?;

    let options = desired.replication.options();
    let mut params = Vec::with_capacity(2 + 2 * options.len());
    params.push(CqlParam::Text(desired.replication.class().to_string()));

    let mut cql = format!(
        "{} {} WITH REPLICATION = {{ 'class' : ?",
        kind.prefix(),
        quote_identifier(&desired.name)
    );
    for (key, count) in options {
        cql.push_str(", ? : ?");
        params.push(CqlParam::Text(key.to_string()));
        params.push(CqlParam::Int(i64::from(count)));
    }
    cql.push_str(" } AND DURABLE_WRITES = ?");
    params.push(CqlParam::Bool(desired.durable_writes));

    Ok(Statement {
        kind,
        keyspace: desired.name.clone(),
        cql,
        params,
    })
}

/// Build the drop statement for a keyspace.
pub fn build_drop(name: &str) -> Statement {
    Statement {
        kind: StatementKind::Drop,
        keyspace: name.to_string(),
        cql: format!("{} {}", StatementKind::Drop.prefix(), quote_identifier(name)),
        params: Vec::new(),
    }
}
