use std::fmt;

use roomsync_shared::Value;

use crate::error::SchemaError;

/// Declared type of a struct field or of a collection's elements
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Bool,
    Int,
    Float,
    Str,
    Struct(String),
    Sequence(Box<FieldType>),
    Mapping(Box<FieldType>),
}

impl FieldType {
    pub fn structure(type_name: &str) -> Self {
        FieldType::Struct(type_name.to_string())
    }

    pub fn sequence_of(element: FieldType) -> Self {
        FieldType::Sequence(Box::new(element))
    }

    pub fn mapping_of(element: FieldType) -> Self {
        FieldType::Mapping(Box::new(element))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            FieldType::Bool | FieldType::Int | FieldType::Float | FieldType::Str
        )
    }

    /// Checks a primitive value against this type, widening integers into
    /// float slots. Returns `None` when the value does not fit.
    pub(crate) fn coerce_primitive(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (FieldType::Bool, value @ Value::Bool(_)) => Some(value),
            (FieldType::Int, value @ Value::Int(_)) => Some(value),
            (FieldType::Float, value @ Value::Float(_)) => Some(value),
            (FieldType::Float, Value::Int(value)) => Some(Value::Float(value as f64)),
            (FieldType::Str, value @ Value::Str(_)) => Some(value),
            _ => None,
        }
    }

    fn referenced_struct(&self) -> Option<&str> {
        match self {
            FieldType::Struct(name) => Some(name),
            FieldType::Sequence(element) | FieldType::Mapping(element) => {
                element.referenced_struct()
            }
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Bool => write!(f, "boolean"),
            FieldType::Int => write!(f, "int"),
            FieldType::Float => write!(f, "number"),
            FieldType::Str => write!(f, "string"),
            FieldType::Struct(name) => write!(f, "{}", name),
            FieldType::Sequence(element) => write!(f, "[{}]", element),
            FieldType::Mapping(element) => write!(f, "{{map: {}}}", element),
        }
    }
}

/// Whether a field's child is replicated to everyone who can see the owning
/// struct, or only to sessions that can reach the child on their own
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Visibility {
    Shared,
    View,
}

/// Value a field holds right after its struct is constructed
#[derive(Clone, Debug, PartialEq)]
pub enum Initializer {
    Null,
    Value(Value),
    /// A fresh child: a struct with its own defaults or an empty collection
    Construct,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
    pub visibility: Visibility,
    pub init: Initializer,
}

impl FieldDef {
    pub fn new(name: &str, ty: FieldType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            visibility: Visibility::Shared,
            init: Initializer::Null,
        }
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.init = Initializer::Value(value.into());
        self
    }

    pub fn construct(mut self) -> Self {
        self.init = Initializer::Construct;
        self
    }

    pub fn view_only(mut self) -> Self {
        self.visibility = Visibility::View;
        self
    }
}

/// An ordered set of typed fields
#[derive(Clone, Debug, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl StructDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }
}

/// The struct types a room's state is built from, plus the type of its root
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    root: String,
    structs: Vec<StructDef>,
}

impl Schema {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
            structs: Vec::new(),
        }
    }

    pub fn define(mut self, def: StructDef) -> Self {
        self.structs.push(def);
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn get(&self, type_name: &str) -> Option<&StructDef> {
        self.structs.iter().find(|def| def.name == type_name)
    }

    pub fn structs(&self) -> &[StructDef] {
        &self.structs
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.get(&self.root).is_none() {
            return Err(SchemaError::MissingRoot {
                type_name: self.root.clone(),
            });
        }

        for (index, def) in self.structs.iter().enumerate() {
            if self.structs[..index].iter().any(|other| other.name == def.name) {
                return Err(SchemaError::DuplicateType {
                    type_name: def.name.clone(),
                });
            }
            for (field_index, field) in def.fields.iter().enumerate() {
                if def.fields[..field_index]
                    .iter()
                    .any(|other| other.name == field.name)
                {
                    return Err(SchemaError::DuplicateField {
                        owner: def.name.clone(),
                        field: field.name.clone(),
                    });
                }
                if let Some(type_name) = field.ty.referenced_struct() {
                    if self.get(type_name).is_none() {
                        return Err(SchemaError::UndefinedType {
                            owner: def.name.clone(),
                            type_name: type_name.to_string(),
                        });
                    }
                }
                let valid_init = match &field.init {
                    Initializer::Null => true,
                    Initializer::Construct => !field.ty.is_primitive(),
                    Initializer::Value(value) => {
                        field.ty.is_primitive()
                            && field.ty.coerce_primitive(value.clone()).is_some()
                    }
                };
                if !valid_init {
                    return Err(SchemaError::InvalidInitializer {
                        owner: def.name.clone(),
                        field: field.name.clone(),
                    });
                }
            }
        }

        for def in &self.structs {
            let mut trail = vec![def.name.clone()];
            self.check_construct_cycle(&def.name, &mut trail)?;
        }

        Ok(())
    }

    // Constructed struct fields build their child eagerly, so a type may not
    // construct itself through any chain of such fields.
    fn check_construct_cycle(
        &self,
        type_name: &str,
        trail: &mut Vec<String>,
    ) -> Result<(), SchemaError> {
        let Some(def) = self.get(type_name) else {
            return Ok(());
        };
        for field in &def.fields {
            if field.init != Initializer::Construct {
                continue;
            }
            let FieldType::Struct(child) = &field.ty else {
                continue;
            };
            if *child == trail[0] {
                return Err(SchemaError::ConstructCycle {
                    type_name: trail[0].clone(),
                    path: format!("{}.{}", trail.join("."), field.name),
                });
            }
            if trail.contains(child) {
                continue;
            }
            trail.push(child.clone());
            self.check_construct_cycle(child, trail)?;
            trail.pop();
        }
        Ok(())
    }
}
