//! Type registry for ghql.
//!
//! The registry is an immutable value built once at startup and shared
//! (usually behind an `Arc`) with whatever executes queries against it.

use crate::resolver::RawRecord;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt::{self, Write as _};

/// Name of the root query type.
pub const QUERY_TYPE: &str = "Query";

/// Name of the GitHub user output type.
pub const USER_TYPE: &str = "UserType";

/// Built-in scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    String,
    Int,
    Float,
    Boolean,
    Id,
}

impl ScalarType {
    /// Returns the GraphQL name of the scalar.
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::Boolean => "Boolean",
            Self::Id => "ID",
        }
    }

    /// Returns true if an input value has the right JSON shape for this scalar.
    ///
    /// Only used for arguments. Output values are passed through untouched.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Id => value.is_string() || value.is_i64() || value.is_u64(),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A pure transform from the parent record to a field value.
pub type TransformFn = fn(&RawRecord) -> Value;

/// How a field obtains its value from the parent record.
#[derive(Clone)]
pub enum FieldResolve {
    /// Property lookup under the given key.
    Direct(String),
    /// Computed from the whole record. The field name only labels the output.
    Computed(TransformFn),
}

impl fmt::Debug for FieldResolve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(key) => f.debug_tuple("Direct").field(key).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Output field declaration.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub description: Option<String>,
    pub ty: ScalarType,
    pub resolve: FieldResolve,
}

impl FieldSpec {
    /// Declares a field that passes the upstream key of the same name through.
    pub fn direct(name: impl Into<String>, ty: ScalarType) -> Self {
        let name = name.into();
        Self {
            resolve: FieldResolve::Direct(name.clone()),
            name,
            description: None,
            ty,
        }
    }

    /// Declares a field computed by `transform`.
    pub fn computed(name: impl Into<String>, ty: ScalarType, transform: TransformFn) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            resolve: FieldResolve::Computed(transform),
        }
    }

    /// Sets the description.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Object type definition.
#[derive(Debug, Clone)]
pub struct ObjectType {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldSpec>,
}

impl ObjectType {
    /// Creates an object type with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
        }
    }

    /// Sets the description.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Adds a field. A later field with the same name replaces the earlier one.
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.insert(spec.name.clone(), spec);
        self
    }

    /// Gets a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }
}

/// Argument definition.
#[derive(Debug, Clone)]
pub struct ArgumentSpec {
    pub name: String,
    pub description: Option<String>,
    pub ty: ScalarType,
}

impl ArgumentSpec {
    pub fn new(name: impl Into<String>, ty: ScalarType) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
        }
    }
}

/// The field on the query root backed by the upstream fetch.
#[derive(Debug, Clone)]
pub struct RootField {
    pub name: String,
    pub description: Option<String>,
    pub arguments: IndexMap<String, ArgumentSpec>,
    pub return_type: String,
}

impl RootField {
    pub fn new(name: impl Into<String>, return_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            arguments: IndexMap::new(),
            return_type: return_type.into(),
        }
    }

    /// Sets the description.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Adds an argument.
    pub fn argument(mut self, arg: ArgumentSpec) -> Self {
        self.arguments.insert(arg.name.clone(), arg);
        self
    }
}

/// The declared schema: one query root field and the object types it returns.
#[derive(Debug, Clone)]
pub struct Registry {
    query_type: String,
    query_description: Option<String>,
    root: RootField,
    types: IndexMap<String, ObjectType>,
}

impl Registry {
    /// Creates a registry builder.
    pub fn builder(root: RootField) -> RegistryBuilder {
        RegistryBuilder::new(root)
    }

    /// The registry served by ghql: `user(login)` over the GitHub users API.
    pub fn github() -> Self {
        let user = ObjectType::new(USER_TYPE)
            .description("A GitHub user profile.")
            .field(FieldSpec::direct("name", ScalarType::String))
            .field(FieldSpec::direct("email", ScalarType::String))
            .field(
                FieldSpec::computed("about", ScalarType::String, about)
                    .description("The profile bio."),
            )
            .field(FieldSpec::direct("following", ScalarType::Int))
            .field(FieldSpec::direct("followers", ScalarType::Int));

        let root = RootField::new("user", USER_TYPE)
            .description("Looks up a GitHub user by login.")
            .argument(ArgumentSpec::new("login", ScalarType::String));

        Self::builder(root)
            .description("Root query type.")
            .add_type(user)
            .build()
    }

    /// Name of the query root type.
    pub fn query_type(&self) -> &str {
        &self.query_type
    }

    /// The upstream-backed root field.
    pub fn root_field(&self) -> &RootField {
        &self.root
    }

    /// Gets an object type by name.
    pub fn object(&self, name: &str) -> Option<&ObjectType> {
        self.types.get(name)
    }

    /// Prints the registry as schema definition language.
    pub fn to_sdl(&self) -> String {
        let mut out = String::new();

        write_description(&mut out, "", self.query_description.as_deref());
        let _ = writeln!(out, "type {} {{", self.query_type);
        write_description(&mut out, "  ", self.root.description.as_deref());
        let args = self
            .root
            .arguments
            .values()
            .map(|a| format!("{}: {}", a.name, a.ty))
            .collect::<Vec<_>>();
        if args.is_empty() {
            let _ = writeln!(out, "  {}: {}", self.root.name, self.root.return_type);
        } else {
            let _ = writeln!(
                out,
                "  {}({}): {}",
                self.root.name,
                args.join(", "),
                self.root.return_type
            );
        }
        out.push_str("}\n");

        for object in self.types.values() {
            out.push('\n');
            write_description(&mut out, "", object.description.as_deref());
            let _ = writeln!(out, "type {} {{", object.name);
            for field in object.fields.values() {
                write_description(&mut out, "  ", field.description.as_deref());
                let _ = writeln!(out, "  {}: {}", field.name, field.ty);
            }
            out.push_str("}\n");
        }

        out
    }
}

fn write_description(out: &mut String, indent: &str, desc: Option<&str>) {
    if let Some(desc) = desc {
        let escaped = desc.replace('\\', "\\\\").replace('"', "\\\"");
        let _ = writeln!(out, "{indent}\"{escaped}\"");
    }
}

/// `UserType.about` is the upstream `bio`.
fn about(user: &RawRecord) -> Value {
    user.get("bio").cloned().unwrap_or(Value::Null)
}

/// Registry builder.
#[derive(Debug)]
pub struct RegistryBuilder {
    registry: Registry,
}

impl RegistryBuilder {
    /// Creates a builder around the given root field.
    pub fn new(root: RootField) -> Self {
        Self {
            registry: Registry {
                query_type: QUERY_TYPE.to_string(),
                query_description: None,
                root,
                types: IndexMap::new(),
            },
        }
    }

    /// Sets the query root description.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.registry.query_description = Some(desc.into());
        self
    }

    /// Adds an object type.
    pub fn add_type(mut self, object: ObjectType) -> Self {
        self.registry.types.insert(object.name.clone(), object);
        self
    }

    /// Builds the registry.
    pub fn build(self) -> Registry {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test records are objects"),
        }
    }

    #[test]
    fn test_github_registry_fields() {
        let registry = Registry::github();
        let user = registry.object(USER_TYPE).unwrap();

        let names: Vec<_> = user.fields.keys().map(String::as_str).collect();
        assert_eq!(names, ["name", "email", "about", "following", "followers"]);
        assert_eq!(user.get_field("following").unwrap().ty, ScalarType::Int);
        assert!(matches!(
            user.get_field("email").unwrap().resolve,
            FieldResolve::Direct(ref key) if key == "email"
        ));
        assert!(matches!(
            user.get_field("about").unwrap().resolve,
            FieldResolve::Computed(_)
        ));
    }

    #[test]
    fn test_root_field() {
        let registry = Registry::github();
        let root = registry.root_field();

        assert_eq!(registry.query_type(), "Query");
        assert_eq!(root.name, "user");
        assert_eq!(root.return_type, USER_TYPE);
        assert_eq!(root.arguments["login"].ty, ScalarType::String);
    }

    #[test]
    fn test_about_reads_bio() {
        assert_eq!(about(&record(json!({"bio": "Mathematician"}))), "Mathematician");
        assert_eq!(about(&record(json!({"about": "ignored"}))), Value::Null);
    }

    #[test]
    fn test_scalar_accepts() {
        assert!(ScalarType::String.accepts(&json!("ada")));
        assert!(!ScalarType::String.accepts(&json!(1)));
        assert!(ScalarType::Int.accepts(&json!(3)));
        assert!(!ScalarType::Int.accepts(&json!(3.5)));
        assert!(ScalarType::Id.accepts(&json!(7)));
        assert!(!ScalarType::Boolean.accepts(&Value::Null));
    }

    #[test]
    fn test_sdl() {
        insta::assert_snapshot!(Registry::github().to_sdl().trim_end(), @r#"
        "Root query type."
        type Query {
          "Looks up a GitHub user by login."
          user(login: String): UserType
        }

        "A GitHub user profile."
        type UserType {
          name: String
          email: String
          "The profile bio."
          about: String
          following: Int
          followers: Int
        }
        "#);
    }

    #[test]
    fn test_builder_custom_root() {
        let registry = Registry::builder(RootField::new("viewer", "Viewer"))
            .add_type(ObjectType::new("Viewer").field(FieldSpec::direct("id", ScalarType::Id)))
            .build();

        assert_eq!(registry.query_type(), QUERY_TYPE);
        assert!(registry.object("Viewer").is_some());
        assert!(registry.to_sdl().contains("type Query {\n  viewer: Viewer\n}"));
    }
}
