//! instaq protocol types.
//!
//! This crate defines the vocabulary shared by the query engine and its callers:
//!
//! - [`instance`] - `(type, id)` object identities
//! - [`value`] - cell and result values
//! - [`query`] - instance queries and their selection trees
//! - [`error`] - protocol error types
//!
//! All types derive serde's `Serialize` and `Deserialize`, so a request can be
//! shipped as JSON to whatever process owns the database connection.

pub mod error;
pub mod instance;
pub mod query;
pub mod value;

pub use error::Error;
pub use instance::Instance;
pub use query::{InstanceQuery, Selection};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_json_roundtrip() {
        let query = InstanceQuery::new("Document")
            .with_instance(Instance::new("Document", 114))
            .select(Selection::attribute("Name").with_alias("name"))
            .select(Selection::linkto(
                "Company",
                vec![Selection::attribute("Name").with_alias("company")],
            ));

        let json = serde_json::to_string(&query).unwrap();
        let back: InstanceQuery = serde_json::from_str(&json).unwrap();
        assert_eq!(query, back);
    }
}
