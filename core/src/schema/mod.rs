//! # Type descriptors and JSON Schema generation
//!
//! Models need a JSON Schema to know how to call a function. Instead of runtime reflection,
//! every type that can appear in function arguments describes itself through [`Describe`],
//! returning a small [`Shape`] tree. [`SchemaGenerator`] walks that tree and renders it.
//!
//! Nested shapes are plain function pointers (`fn() -> Shape`), so the descriptor of a
//! self-referential type is finite; the generator resolves the cycle through `$defs`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chatloop::Describe;
//!
//! #[derive(Describe)]
//! enum Unit { Celsius, Fahrenheit }
//!
//! #[derive(Describe)]
//! struct Forecast {
//!     /// City name, e.g. "Amsterdam"
//!     location: String,
//!     unit: Option<Unit>,
//!     days: Vec<u8>,
//! }
//!
//! let schema = chatloop::schema_for::<Forecast>();
//! ```
//!
//! ## Mapping
//!
//! | Rust | JSON Schema |
//! |------|-------------|
//! | `String`, `char` | `string` |
//! | `f32`, `f64` | `number` |
//! | integer kinds | `integer` |
//! | `bool` | `boolean` |
//! | unit-only enums | `string` with an `enum` list of member names |
//! | `Vec<T>`, `[T; N]`, sets | `array` with `items` |
//! | `Option<T>` | `T`, not listed as required |
//! | structs | `object`, emitted once into `$defs` and referenced |

mod generator;

use core::any::TypeId;
use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

pub use generator::{SchemaGenerator, schema_for, schema_for_arguments, schema_for_signature};

/// Lazily produced shape of a nested type.
pub type ShapeFn = fn() -> Shape;

/// Types that can describe their JSON shape.
///
/// Implemented for primitives and common containers; derive it for your own structs and
/// unit-only enums with `#[derive(Describe)]`.
pub trait Describe: 'static {
    /// Returns the shape of this type.
    fn describe() -> Shape;
}

/// The JSON shape of a type.
///
/// Not comparable: nested shapes are function pointers, whose addresses say nothing about the
/// shape they build. Compare rendered schemas instead.
#[derive(Debug, Clone)]
pub enum Shape {
    /// Text.
    String,
    /// Floating point or decimal number.
    Number,
    /// Integer number.
    Integer,
    /// `true` or `false`.
    Boolean,
    /// A string restricted to a fixed list of member names.
    Enum(EnumShape),
    /// A sequence whose elements have the given shape.
    Array(ShapeFn),
    /// A value that may be left out.
    Optional(ShapeFn),
    /// A composite type with named fields.
    Object(ObjectShape),
}

impl Shape {
    /// Returns `true` for [`Shape::Optional`].
    #[must_use]
    pub const fn is_optional(&self) -> bool {
        matches!(self, Self::Optional(_))
    }
}

/// Members of an enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumShape {
    variants: Vec<Cow<'static, str>>,
}

impl EnumShape {
    /// Creates an enumeration from its member names.
    pub fn new<S: Into<Cow<'static, str>>>(variants: impl IntoIterator<Item = S>) -> Self {
        Self {
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the member names in declaration order.
    #[must_use]
    pub fn variants(&self) -> &[Cow<'static, str>] {
        &self.variants
    }
}

/// A composite type.
///
/// The [`TypeId`] is the identity used to deduplicate definitions, the name is the key shown
/// in `$defs`.
#[derive(Debug, Clone)]
pub struct ObjectShape {
    id: TypeId,
    name: Cow<'static, str>,
    fields: Vec<Field>,
    require_all: bool,
}

impl ObjectShape {
    /// Creates the shape of `T` with the given fields.
    pub fn new<T: ?Sized + 'static>(
        name: impl Into<Cow<'static, str>>,
        fields: Vec<Field>,
    ) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: name.into(),
            fields,
            require_all: false,
        }
    }

    /// Marks every field as required, optional ones included.
    ///
    /// Used for the argument lists of functions, where every parameter must be supplied.
    #[must_use]
    pub const fn require_all(mut self) -> Self {
        self.require_all = true;
        self
    }

    /// Returns the type identity.
    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns `true` if every field is required regardless of its shape.
    #[must_use]
    pub const fn requires_all(&self) -> bool {
        self.require_all
    }
}

/// A named field of an object, or a parameter of a function.
#[derive(Debug, Clone)]
pub struct Field {
    name: Cow<'static, str>,
    description: Option<Cow<'static, str>>,
    shape: ShapeFn,
}

impl Field {
    /// Creates a field holding a `T`.
    pub fn of<T: Describe>(name: impl Into<Cow<'static, str>>) -> Self {
        Self::with_shape(name, T::describe)
    }

    /// Creates a field from an explicit shape function.
    pub fn with_shape(name: impl Into<Cow<'static, str>>, shape: ShapeFn) -> Self {
        Self {
            name: name.into(),
            description: None,
            shape,
        }
    }

    /// Attaches a human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description, if one was declared.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Builds the shape of the field's type.
    #[must_use]
    pub fn shape(&self) -> Shape {
        (self.shape)()
    }
}

macro_rules! describe_as {
    ($shape:ident: $($ty:ty),*) => {
        $(
            impl Describe for $ty {
                fn describe() -> Shape {
                    Shape::$shape
                }
            }
        )*
    };
}

describe_as!(String: String, char);
describe_as!(Number: f32, f64);
describe_as!(Integer: i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
describe_as!(Boolean: bool);

macro_rules! describe_array {
    ($($ty:ident),*) => {
        $(
            impl<T: Describe> Describe for $ty<T> {
                fn describe() -> Shape {
                    Shape::Array(T::describe)
                }
            }
        )*
    };
}

describe_array!(Vec, VecDeque, BTreeSet, HashSet);

impl<T: Describe, const N: usize> Describe for [T; N] {
    fn describe() -> Shape {
        Shape::Array(T::describe)
    }
}

impl<T: Describe> Describe for Option<T> {
    fn describe() -> Shape {
        Shape::Optional(T::describe)
    }
}

macro_rules! describe_transparent {
    ($($ty:ident),*) => {
        $(
            impl<T: Describe> Describe for $ty<T> {
                fn describe() -> Shape {
                    T::describe()
                }
            }
        )*
    };
}

describe_transparent!(Box, Arc, Rc);

impl Describe for () {
    fn describe() -> Shape {
        Shape::Object(ObjectShape::new::<()>("Unit", Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives() {
        assert!(matches!(String::describe(), Shape::String));
        assert!(matches!(f32::describe(), Shape::Number));
        assert!(matches!(u64::describe(), Shape::Integer));
        assert!(matches!(bool::describe(), Shape::Boolean));
    }

    #[test]
    fn containers() {
        let Shape::Array(item) = Vec::<i32>::describe() else {
            panic!("expected array");
        };
        assert!(matches!(item(), Shape::Integer));

        assert!(Option::<String>::describe().is_optional());
        assert!(matches!(Box::<bool>::describe(), Shape::Boolean));
        assert!(matches!(<[u8; 4]>::describe(), Shape::Array(_)));
    }

    #[test]
    fn equivalent_shapes_render_alike() {
        use super::schema_for;

        assert_eq!(schema_for::<Box<Vec<u8>>>(), schema_for::<Vec<u8>>());
        assert_eq!(schema_for::<Rc<[u8; 3]>>(), schema_for::<VecDeque<u8>>());
        assert_ne!(schema_for::<Vec<u8>>(), schema_for::<Vec<f32>>());
    }

    #[test]
    fn field_builder() {
        let field = Field::of::<String>("location").with_description("City name");
        assert_eq!(field.name(), "location");
        assert_eq!(field.description(), Some("City name"));
        assert!(matches!(field.shape(), Shape::String));

        assert_eq!(Field::of::<u8>("days").description(), None);
    }

    #[test]
    fn object_identity() {
        struct Marker;
        let object = ObjectShape::new::<Marker>("Marker", vec![Field::of::<u8>("a")]);
        assert_eq!(object.id(), TypeId::of::<Marker>());
        assert_eq!(object.name(), "Marker");
        assert!(!object.requires_all());
        assert!(object.require_all().requires_all());
    }
}
