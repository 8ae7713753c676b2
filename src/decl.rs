use serde::Deserialize;

/// JVM primitive types with their descriptor letters.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Primitive {
    Void,
    Boolean,
    Char,
    Byte,
    Short,
    Int,
    Float,
    Long,
    Double,
}

impl Primitive {
    pub(crate) fn letter(self) -> char {
        match self {
            Primitive::Void => 'V',
            Primitive::Boolean => 'Z',
            Primitive::Char => 'C',
            Primitive::Byte => 'B',
            Primitive::Short => 'S',
            Primitive::Int => 'I',
            Primitive::Float => 'F',
            Primitive::Long => 'J',
            Primitive::Double => 'D',
        }
    }
}

/// Resolved class reference: dotted package plus the nested simple-name chain.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub(crate) struct ClassRef {
    #[serde(default)]
    pub(crate) package: String,
    pub(crate) names: Vec<String>,
}

impl ClassRef {
    /// Binary-style internal name: `com/acme/Outer$Inner`. Nested classes join
    /// with `$`, never `.`. `None` marks an unresolved owner.
    pub(crate) fn internal_name(&self) -> Option<String> {
        if self.names.is_empty() || self.names.iter().any(|name| name.is_empty()) {
            return None;
        }
        let chain = self.names.join("$");
        if self.package.is_empty() {
            Some(chain)
        } else {
            Some(format!("{}/{}", self.package.replace('.', "/"), chain))
        }
    }

    fn descriptor(&self, dims: usize) -> Option<String> {
        let name = self.internal_name()?;
        Some(format!("{}L{};", "[".repeat(dims), name))
    }
}

/// Erased parameter or return type of a declaration.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum TypeRef {
    Primitive(Primitive),
    Class(ClassRef),
    Array { dims: u8, component: Box<TypeRef> },
    /// A type the host model failed to resolve; the declaration is skipped.
    Unresolved,
}

impl TypeRef {
    pub(crate) fn descriptor(&self) -> Option<String> {
        self.descriptor_with_dims(0)
    }

    fn descriptor_with_dims(&self, dims: usize) -> Option<String> {
        match self {
            TypeRef::Primitive(primitive) => {
                Some(format!("{}{}", "[".repeat(dims), primitive.letter()))
            }
            TypeRef::Class(class) => class.descriptor(dims),
            TypeRef::Array { dims: more, component } => {
                component.descriptor_with_dims(dims + usize::from(*more))
            }
            TypeRef::Unresolved => None,
        }
    }
}

/// Source-level method or constructor submitted for fact synthesis.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Declaration {
    pub(crate) owner: ClassRef,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) params: Vec<TypeRef>,
    /// `None` marks a constructor.
    #[serde(default)]
    pub(crate) return_type: Option<TypeRef>,
    /// Enclosing class, present for nested owners.
    #[serde(default)]
    pub(crate) outer: Option<ClassRef>,
    /// Whether the owner is a static nested class.
    #[serde(default)]
    pub(crate) static_member: bool,
}

/// Identity strings fed into the key digest.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct DeclarationIdentity {
    pub(crate) owner: String,
    pub(crate) member_name: String,
    pub(crate) descriptor: String,
}

impl Declaration {
    pub(crate) fn is_constructor(&self) -> bool {
        self.return_type.is_none()
    }

    pub(crate) fn member_name(&self) -> &str {
        if self.is_constructor() { "<init>" } else { &self.name }
    }

    /// Source-level arity; the implicit outer-instance parameter of a nested
    /// constructor is not counted.
    pub(crate) fn arity(&self) -> usize {
        self.params.len()
    }

    fn has_implicit_outer_param(&self) -> bool {
        self.is_constructor() && self.outer.is_some() && !self.static_member
    }

    /// Erased JVM method descriptor, or `None` when any type is unresolved.
    pub(crate) fn method_descriptor(&self) -> Option<String> {
        let mut descriptor = String::from("(");
        if self.has_implicit_outer_param() {
            // Implicit outer-instance parameter: L<outer>; with no dimension brackets.
            descriptor.push_str(&self.outer.as_ref()?.descriptor(0)?);
        }
        for param in &self.params {
            descriptor.push_str(&param.descriptor()?);
        }
        descriptor.push(')');
        match &self.return_type {
            None => descriptor.push('V'),
            Some(return_type) => descriptor.push_str(&return_type.descriptor()?),
        }
        Some(descriptor)
    }

    /// `None` when the owner or any referenced type cannot be resolved; callers
    /// skip the declaration instead of failing the batch.
    pub(crate) fn identity(&self) -> Option<DeclarationIdentity> {
        Some(DeclarationIdentity {
            owner: self.owner.internal_name()?,
            member_name: self.member_name().to_string(),
            descriptor: self.method_descriptor()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(package: &str, names: &[&str]) -> ClassRef {
        ClassRef {
            package: package.to_string(),
            names: names.iter().map(|name| name.to_string()).collect(),
        }
    }

    fn method(owner: ClassRef, name: &str, params: Vec<TypeRef>, return_type: TypeRef) -> Declaration {
        Declaration {
            owner,
            name: name.to_string(),
            params,
            return_type: Some(return_type),
            outer: None,
            static_member: false,
        }
    }

    #[test]
    fn renders_primitive_table() {
        let cases = [
            (Primitive::Void, "V"),
            (Primitive::Boolean, "Z"),
            (Primitive::Char, "C"),
            (Primitive::Byte, "B"),
            (Primitive::Short, "S"),
            (Primitive::Int, "I"),
            (Primitive::Float, "F"),
            (Primitive::Long, "J"),
            (Primitive::Double, "D"),
        ];
        for (primitive, expected) in cases {
            let rendered = TypeRef::Primitive(primitive).descriptor().expect("descriptor");
            assert_eq!(rendered, expected);
        }
    }

    #[test]
    fn renders_arrays_and_classes() {
        let strings = TypeRef::Array {
            dims: 2,
            component: Box::new(TypeRef::Class(class("java.lang", &["String"]))),
        };
        assert_eq!(strings.descriptor().expect("descriptor"), "[[Ljava/lang/String;");

        let ints = TypeRef::Array {
            dims: 1,
            component: Box::new(TypeRef::Primitive(Primitive::Int)),
        };
        assert_eq!(ints.descriptor().expect("descriptor"), "[I");
    }

    #[test]
    fn nested_class_uses_dollar_separator() {
        let inner = class("com.acme", &["Outer", "Inner"]);
        assert_eq!(inner.internal_name().expect("name"), "com/acme/Outer$Inner");

        let unpackaged = class("", &["Top"]);
        assert_eq!(unpackaged.internal_name().expect("name"), "Top");
    }

    #[test]
    fn renders_method_descriptor() {
        let declaration = method(
            class("com.acme", &["Util"]),
            "indexOf",
            vec![
                TypeRef::Class(class("java.lang", &["Object"])),
                TypeRef::Primitive(Primitive::Int),
            ],
            TypeRef::Primitive(Primitive::Boolean),
        );
        let identity = declaration.identity().expect("identity");
        assert_eq!(identity.owner, "com/acme/Util");
        assert_eq!(identity.member_name, "indexOf");
        assert_eq!(identity.descriptor, "(Ljava/lang/Object;I)Z");
    }

    #[test]
    fn constructor_renders_init_and_void() {
        let declaration = Declaration {
            owner: class("com.acme", &["Box"]),
            name: "Box".to_string(),
            params: vec![TypeRef::Primitive(Primitive::Long)],
            return_type: None,
            outer: None,
            static_member: false,
        };
        let identity = declaration.identity().expect("identity");
        assert_eq!(identity.member_name, "<init>");
        assert_eq!(identity.descriptor, "(J)V");
    }

    #[test]
    fn inner_class_constructor_prepends_outer_instance() {
        let declaration = Declaration {
            owner: class("com.acme", &["Outer", "Inner"]),
            name: "Inner".to_string(),
            params: vec![TypeRef::Primitive(Primitive::Int)],
            return_type: None,
            outer: Some(class("com.acme", &["Outer"])),
            static_member: false,
        };
        let identity = declaration.identity().expect("identity");
        assert_eq!(identity.descriptor, "(Lcom/acme/Outer;I)V");
        assert_eq!(declaration.arity(), 1);
    }

    #[test]
    fn static_nested_constructor_has_no_implicit_param() {
        let declaration = Declaration {
            owner: class("com.acme", &["Outer", "Nested"]),
            name: "Nested".to_string(),
            params: Vec::new(),
            return_type: None,
            outer: Some(class("com.acme", &["Outer"])),
            static_member: true,
        };
        let identity = declaration.identity().expect("identity");
        assert_eq!(identity.descriptor, "()V");
    }

    #[test]
    fn unresolved_type_yields_no_identity() {
        let declaration = method(
            class("com.acme", &["Util"]),
            "broken",
            vec![TypeRef::Unresolved],
            TypeRef::Primitive(Primitive::Void),
        );
        assert!(declaration.identity().is_none());

        let unresolved_owner = method(
            ClassRef {
                package: "com.acme".to_string(),
                names: Vec::new(),
            },
            "orphan",
            Vec::new(),
            TypeRef::Primitive(Primitive::Void),
        );
        assert!(unresolved_owner.identity().is_none());
    }
}
