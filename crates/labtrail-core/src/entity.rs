// ABOUTME: The Entity trait binding a Rust type to its entity-type name and payload schema.
// ABOUTME: Payloads decode through serde, so any Deserialize type can be read historically.

use serde::de::DeserializeOwned;

/// A domain type with a stable entity-type name whose revisions carry a
/// serde-decodable payload.
///
/// Reference attributes pointing at other entities are
/// [`Reference`](crate::link::Reference) fields, which serialize as the
/// bare target id.
///
/// ```
/// use labtrail_core::{Entity, Reference};
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// struct Name {
///     name: String,
/// }
///
/// impl Entity for Name {
///     const ENTITY_TYPE: &'static str = "name";
/// }
///
/// #[derive(Debug, Deserialize)]
/// struct User {
///     email: String,
///     name_id: Reference<Name>,
/// }
///
/// impl Entity for User {
///     const ENTITY_TYPE: &'static str = "user";
/// }
/// ```
pub trait Entity: DeserializeOwned {
    /// The schema name this type's revisions are recorded under.
    const ENTITY_TYPE: &'static str;
}
