//! Capability-based view access.
//!
//! A [`CapabilitySet`] is the stock [`AccessOracle`]: it grants view access by
//! type scope or by individual instance, and explicit denials override grants.

use std::collections::HashSet;

use super::error::{AccessError, AccessResult};
use super::oracle::AccessOracle;
use instaq_proto::Instance;

/// Scope of type access.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeScope {
    /// Every type.
    All,
    /// One type.
    Type(String),
    /// Types matching a pattern (e.g., "Doc*" or "*Line").
    Pattern(String),
}

impl TypeScope {
    /// Check if this scope matches the given type name.
    pub fn matches(&self, type_name: &str) -> bool {
        match self {
            TypeScope::All => true,
            TypeScope::Type(name) => name == type_name,
            TypeScope::Pattern(pattern) => {
                if let Some(prefix) = pattern.strip_suffix('*') {
                    type_name.starts_with(prefix)
                } else if let Some(suffix) = pattern.strip_prefix('*') {
                    type_name.ends_with(suffix)
                } else {
                    type_name == pattern
                }
            }
        }
    }
}

/// A view capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// View every instance of the matching types.
    View(TypeScope),
    /// View one instance.
    ViewInstance(Instance),
    /// View everything.
    Admin,
}

impl Capability {
    /// Parse a capability from a string.
    ///
    /// Examples:
    /// - `view:*` - view all types
    /// - `view:Document` - view Document instances
    /// - `view:Doc*` - view types starting with "Doc"
    /// - `instance:Document.114` - view one instance
    /// - `admin` - view everything
    pub fn parse(s: &str) -> AccessResult<Self> {
        let (kind, arg) = match s.split_once(':') {
            Some((kind, arg)) => (kind, Some(arg)),
            None => (s, None),
        };

        match kind {
            "admin" => Ok(Capability::Admin),
            "view" => Ok(Capability::View(Self::parse_scope(arg))),
            "instance" => {
                let arg = arg.ok_or_else(|| {
                    AccessError::InvalidCapabilityFormat(
                        "instance capability requires Type.id".to_string(),
                    )
                })?;
                let instance = arg
                    .parse::<Instance>()
                    .map_err(|e| AccessError::InvalidCapabilityFormat(e.to_string()))?;
                Ok(Capability::ViewInstance(instance))
            }
            other => Err(AccessError::InvalidCapabilityFormat(format!(
                "unknown capability type: {}",
                other
            ))),
        }
    }

    fn parse_scope(scope: Option<&str>) -> TypeScope {
        match scope {
            None | Some("*") => TypeScope::All,
            Some(s) if s.contains('*') => TypeScope::Pattern(s.to_string()),
            Some(s) => TypeScope::Type(s.to_string()),
        }
    }

    /// Convert capability to string representation.
    pub fn to_string_repr(&self) -> String {
        match self {
            Capability::Admin => "admin".to_string(),
            Capability::View(TypeScope::All) => "view:*".to_string(),
            Capability::View(TypeScope::Type(name)) => format!("view:{}", name),
            Capability::View(TypeScope::Pattern(pattern)) => format!("view:{}", pattern),
            Capability::ViewInstance(instance) => format!("instance:{}", instance),
        }
    }
}

/// A set of capabilities plus explicit instance denials.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    capabilities: HashSet<Capability>,
    denied: HashSet<Instance>,
}

impl CapabilitySet {
    /// Create an empty capability set, which allows nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a capability set from a list of capabilities.
    pub fn from_capabilities(caps: Vec<Capability>) -> Self {
        Self {
            capabilities: caps.into_iter().collect(),
            denied: HashSet::new(),
        }
    }

    /// Parse capabilities from string representations.
    pub fn from_strings(strings: &[&str]) -> AccessResult<Self> {
        let capabilities: AccessResult<HashSet<Capability>> =
            strings.iter().map(|s| Capability::parse(s)).collect();
        Ok(Self {
            capabilities: capabilities?,
            denied: HashSet::new(),
        })
    }

    /// Add a capability to the set.
    pub fn add(&mut self, cap: Capability) {
        self.capabilities.insert(cap);
    }

    /// Deny one instance regardless of grants.
    pub fn deny(&mut self, instance: Instance) {
        self.denied.insert(instance);
    }

    /// Builder form of [`deny`](Self::deny).
    pub fn with_denied(mut self, instance: Instance) -> Self {
        self.deny(instance);
        self
    }

    /// Check if the set contains a specific capability.
    pub fn contains(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// Check if admin access is granted.
    pub fn has_admin(&self) -> bool {
        self.capabilities.contains(&Capability::Admin)
    }

    /// Check if `instance` may be viewed.
    pub fn can_view(&self, instance: &Instance) -> bool {
        if self.has_admin() {
            return true;
        }
        if self.denied.contains(instance) {
            return false;
        }
        self.capabilities.iter().any(|cap| match cap {
            Capability::View(scope) => scope.matches(instance.type_name()),
            Capability::ViewInstance(granted) => granted == instance,
            Capability::Admin => true,
        })
    }

    /// Get all capabilities.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }

    /// Number of capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Check if no capability is granted.
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl AccessOracle for CapabilitySet {
    fn is_allowed(&self, instance: &Instance) -> AccessResult<bool> {
        Ok(self.can_view(instance))
    }
}
