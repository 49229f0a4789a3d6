//! Native declaration and type vocabulary.
//!
//! These are the values the [`Oracle`](crate::oracle::Oracle) answers with:
//! concrete C++ types, function/class/enum/variable declarations, base edges,
//! type traits and implicit conversions. Record and enum names are always
//! fully qualified with a leading `::`; template arguments are part of the
//! type, not of the name.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::names;

// ============================================================================
// Builtin Types
// ============================================================================

/// Fundamental C++ types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Void,
    Bool,
    Char,
    SignedChar,
    UnsignedChar,
    WChar,
    Char16,
    Char32,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Float,
    Double,
    LongDouble,
    NullPtr,
}

/// Substitution class of a builtin type.
///
/// All integral widths are mutually substitutable, as are all floating
/// widths. `bool` is its own category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericCategory {
    Void,
    Boolean,
    Integral,
    Floating,
    NullPtr,
}

/// Keywords that may appear in a builtin type spelling.
pub const BUILTIN_WORDS: &[&str] = &[
    "void", "bool", "char", "wchar_t", "char16_t", "char32_t", "short", "int", "long", "signed",
    "unsigned", "float", "double",
];

impl Builtin {
    /// Canonical spelling.
    pub fn spelling(self) -> &'static str {
        match self {
            Builtin::Void => "void",
            Builtin::Bool => "bool",
            Builtin::Char => "char",
            Builtin::SignedChar => "signed char",
            Builtin::UnsignedChar => "unsigned char",
            Builtin::WChar => "wchar_t",
            Builtin::Char16 => "char16_t",
            Builtin::Char32 => "char32_t",
            Builtin::Short => "short",
            Builtin::UnsignedShort => "unsigned short",
            Builtin::Int => "int",
            Builtin::UnsignedInt => "unsigned int",
            Builtin::Long => "long",
            Builtin::UnsignedLong => "unsigned long",
            Builtin::LongLong => "long long",
            Builtin::UnsignedLongLong => "unsigned long long",
            Builtin::Float => "float",
            Builtin::Double => "double",
            Builtin::LongDouble => "long double",
            Builtin::NullPtr => "std::nullptr_t",
        }
    }

    pub fn category(self) -> NumericCategory {
        match self {
            Builtin::Void => NumericCategory::Void,
            Builtin::Bool => NumericCategory::Boolean,
            Builtin::Float | Builtin::Double | Builtin::LongDouble => NumericCategory::Floating,
            Builtin::NullPtr => NumericCategory::NullPtr,
            _ => NumericCategory::Integral,
        }
    }

    /// Build a builtin from its keyword sequence, in any order
    /// (`unsigned long long int`, `long unsigned`, `signed`).
    pub fn from_words(words: &[&str]) -> Option<Builtin> {
        let mut signed: Option<bool> = None;
        let mut short = false;
        let mut longs = 0usize;
        let mut base: Option<&str> = None;

        for word in words {
            match *word {
                "signed" => signed = Some(true),
                "unsigned" => signed = Some(false),
                "short" => short = true,
                "long" => longs += 1,
                other if BUILTIN_WORDS.contains(&other) => {
                    if base.is_some() {
                        return None;
                    }
                    base = Some(other);
                }
                _ => return None,
            }
        }

        let unsigned = signed == Some(false);
        let plain = signed.is_none() && !short && longs == 0;
        let builtin = match base {
            Some("void") if plain => Builtin::Void,
            Some("bool") if plain => Builtin::Bool,
            Some("wchar_t") if plain => Builtin::WChar,
            Some("char16_t") if plain => Builtin::Char16,
            Some("char32_t") if plain => Builtin::Char32,
            Some("float") if plain => Builtin::Float,
            Some("double") if plain => Builtin::Double,
            Some("double") if signed.is_none() && !short && longs == 1 => Builtin::LongDouble,
            Some("char") if !short && longs == 0 => match signed {
                None => Builtin::Char,
                Some(true) => Builtin::SignedChar,
                Some(false) => Builtin::UnsignedChar,
            },
            None | Some("int") => match (short, longs) {
                (true, 0) if unsigned => Builtin::UnsignedShort,
                (true, 0) => Builtin::Short,
                (false, 0) if base.is_none() && signed.is_none() => return None,
                (false, 0) if unsigned => Builtin::UnsignedInt,
                (false, 0) => Builtin::Int,
                (false, 1) if unsigned => Builtin::UnsignedLong,
                (false, 1) => Builtin::Long,
                (false, 2) if unsigned => Builtin::UnsignedLongLong,
                (false, 2) => Builtin::LongLong,
                _ => return None,
            },
            _ => return None,
        };
        Some(builtin)
    }
}

// ============================================================================
// Native Types
// ============================================================================

/// A template argument: a type or an integral constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateArg {
    Type(NativeType),
    Value(i64),
}

impl fmt::Display for TemplateArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateArg::Type(ty) => write!(f, "{}", ty),
            TemplateArg::Value(v) => write!(f, "{}", v),
        }
    }
}

/// A function signature (used by function types and callables).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub ret: NativeType,
    pub params: Vec<NativeType>,
}

/// Shape of a native type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Builtin(Builtin),
    Record { name: String, args: Vec<TemplateArg> },
    Enum { name: String, scoped: bool },
    Pointer(Box<NativeType>),
    LValueRef(Box<NativeType>),
    RValueRef(Box<NativeType>),
    Function(Box<Signature>),
    /// An undeduced function or class template parameter.
    TemplateParam(String),
}

/// A concrete C++ type with its top-level const qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeType {
    pub kind: TypeKind,
    pub is_const: bool,
}

impl NativeType {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            is_const: false,
        }
    }

    pub fn builtin(builtin: Builtin) -> Self {
        Self::new(TypeKind::Builtin(builtin))
    }

    pub fn void() -> Self {
        Self::builtin(Builtin::Void)
    }

    pub fn record(name: impl Into<String>) -> Self {
        Self::record_with_args(name, Vec::new())
    }

    pub fn record_with_args(name: impl Into<String>, args: Vec<TemplateArg>) -> Self {
        Self::new(TypeKind::Record {
            name: name.into(),
            args,
        })
    }

    pub fn enumeration(name: impl Into<String>, scoped: bool) -> Self {
        Self::new(TypeKind::Enum {
            name: name.into(),
            scoped,
        })
    }

    pub fn pointer_to(pointee: NativeType) -> Self {
        Self::new(TypeKind::Pointer(Box::new(pointee)))
    }

    pub fn lvalue_ref_to(referent: NativeType) -> Self {
        Self::new(TypeKind::LValueRef(Box::new(referent)))
    }

    pub fn rvalue_ref_to(referent: NativeType) -> Self {
        Self::new(TypeKind::RValueRef(Box::new(referent)))
    }

    pub fn function(ret: NativeType, params: Vec<NativeType>) -> Self {
        Self::new(TypeKind::Function(Box::new(Signature { ret, params })))
    }

    pub fn template_param(name: impl Into<String>) -> Self {
        Self::new(TypeKind::TemplateParam(name.into()))
    }

    /// Same type with the given top-level const qualifier.
    pub fn with_const(mut self, is_const: bool) -> Self {
        self.is_const = is_const;
        self
    }

    /// Same type without top-level const.
    pub fn unqualified(&self) -> NativeType {
        self.clone().with_const(false)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Builtin(Builtin::Void))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::Pointer(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.kind, TypeKind::LValueRef(_) | TypeKind::RValueRef(_))
    }

    pub fn pointee(&self) -> Option<&NativeType> {
        match &self.kind {
            TypeKind::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// The referenced type for references, the type itself otherwise.
    pub fn strip_reference(&self) -> &NativeType {
        match &self.kind {
            TypeKind::LValueRef(inner) | TypeKind::RValueRef(inner) => inner,
            _ => self,
        }
    }

    /// Strip every pointer, reference and const layer down to the base type.
    pub fn base(&self) -> NativeType {
        let mut current = self;
        loop {
            match &current.kind {
                TypeKind::Pointer(inner)
                | TypeKind::LValueRef(inner)
                | TypeKind::RValueRef(inner) => current = inner,
                _ => return current.unqualified(),
            }
        }
    }

    pub fn record_name(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Record { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn template_args(&self) -> &[TemplateArg] {
        match &self.kind {
            TypeKind::Record { args, .. } => args,
            _ => &[],
        }
    }

    /// Numeric category of builtin types.
    pub fn category(&self) -> Option<NumericCategory> {
        match &self.kind {
            TypeKind::Builtin(b) => Some(b.category()),
            _ => None,
        }
    }

    /// The single type argument of `template_name<X>`, if this is one.
    pub fn wrapped_by(&self, template_name: &str) -> Option<&NativeType> {
        match &self.kind {
            TypeKind::Record { name, args } if name == template_name => match args.first() {
                Some(TemplateArg::Type(inner)) => Some(inner),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn contains_template_param(&self) -> bool {
        match &self.kind {
            TypeKind::TemplateParam(_) => true,
            TypeKind::Pointer(inner) | TypeKind::LValueRef(inner) | TypeKind::RValueRef(inner) => {
                inner.contains_template_param()
            }
            TypeKind::Record { args, .. } => args.iter().any(|arg| match arg {
                TemplateArg::Type(ty) => ty.contains_template_param(),
                TemplateArg::Value(_) => false,
            }),
            TypeKind::Function(sig) => {
                sig.ret.contains_template_param()
                    || sig.params.iter().any(NativeType::contains_template_param)
            }
            TypeKind::Builtin(_) | TypeKind::Enum { .. } => false,
        }
    }

    /// Replace template parameters with their bindings.
    ///
    /// A const-qualified parameter keeps its qualifier on the substituted type.
    pub fn substitute(&self, bindings: &HashMap<String, NativeType>) -> NativeType {
        let kind = match &self.kind {
            TypeKind::TemplateParam(name) => match bindings.get(name) {
                Some(bound) => {
                    let is_const = bound.is_const || self.is_const;
                    return bound.clone().with_const(is_const);
                }
                None => return self.clone(),
            },
            TypeKind::Pointer(inner) => TypeKind::Pointer(Box::new(inner.substitute(bindings))),
            TypeKind::LValueRef(inner) => TypeKind::LValueRef(Box::new(inner.substitute(bindings))),
            TypeKind::RValueRef(inner) => TypeKind::RValueRef(Box::new(inner.substitute(bindings))),
            TypeKind::Record { name, args } => TypeKind::Record {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|arg| match arg {
                        TemplateArg::Type(ty) => TemplateArg::Type(ty.substitute(bindings)),
                        TemplateArg::Value(v) => TemplateArg::Value(*v),
                    })
                    .collect(),
            },
            TypeKind::Function(sig) => TypeKind::Function(Box::new(Signature {
                ret: sig.ret.substitute(bindings),
                params: sig.params.iter().map(|p| p.substitute(bindings)).collect(),
            })),
            TypeKind::Builtin(_) | TypeKind::Enum { .. } => self.kind.clone(),
        };
        NativeType {
            kind,
            is_const: self.is_const,
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Pointer(inner) => {
                write!(f, "{} *", inner)?;
                if self.is_const {
                    f.write_str("const")?;
                }
                Ok(())
            }
            TypeKind::LValueRef(inner) => write!(f, "{} &", inner),
            TypeKind::RValueRef(inner) => write!(f, "{} &&", inner),
            TypeKind::Function(sig) => {
                write!(f, "{} (", sig.ret)?;
                write_joined(f, &sig.params)?;
                f.write_str(")")
            }
            base => {
                if self.is_const {
                    f.write_str("const ")?;
                }
                match base {
                    TypeKind::Builtin(b) => f.write_str(b.spelling()),
                    TypeKind::Record { name, args } => {
                        f.write_str(name)?;
                        if !args.is_empty() {
                            f.write_str("<")?;
                            write_joined(f, args)?;
                            f.write_str(">")?;
                        }
                        Ok(())
                    }
                    TypeKind::Enum { name, .. } => f.write_str(name),
                    TypeKind::TemplateParam(name) => f.write_str(name),
                    _ => Ok(()),
                }
            }
        }
    }
}

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

// ============================================================================
// Declarations
// ============================================================================

/// Where a declaration lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    #[serde(default)]
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Class traits reported by the oracle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeTraits {
    pub copyable: bool,
    pub movable: bool,
    #[serde(rename = "abstract")]
    pub is_abstract: bool,
    pub has_default_ctor: bool,
    pub trivial_default_ctor: bool,
    pub trivial_dtor: bool,
    pub public_dtor: bool,
    pub polymorphic: bool,
}

impl TypeTraits {
    /// Traits of scalars, pointers and enums.
    pub fn scalar() -> Self {
        Self {
            copyable: true,
            movable: true,
            is_abstract: false,
            has_default_ctor: true,
            trivial_default_ctor: true,
            trivial_dtor: true,
            public_dtor: true,
            polymorphic: false,
        }
    }

    /// Traits of a plain class with implicit special members.
    pub fn regular_class() -> Self {
        Self::scalar()
    }

    /// Whether a value of this type can be handed across the binding boundary.
    pub fn is_transferable(&self) -> bool {
        self.copyable || self.movable
    }
}

/// A function parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeParam {
    pub name: String,
    pub ty: NativeType,
    /// Default argument expression as written.
    pub default: Option<String>,
}

/// Function declaration properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionFlags {
    /// Non-static member function (implicit `this`).
    pub is_member: bool,
    pub is_static: bool,
    pub is_const: bool,
    pub is_constructor: bool,
    pub is_explicit: bool,
    pub is_deleted: bool,
    pub is_deprecated: bool,
    pub is_virtual: bool,
    pub is_pure_virtual: bool,
    pub is_noexcept: bool,
    pub must_use_result: bool,
    pub is_conversion: bool,
}

/// A function, method, constructor or operator declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    pub qualified_name: String,
    pub params: Vec<NativeParam>,
    pub ret: NativeType,
    pub template_params: Vec<String>,
    pub flags: FunctionFlags,
    pub mangled_name: String,
    pub location: SourceLocation,
}

impl FunctionDecl {
    pub fn simple_name(&self) -> &str {
        names::simple_name(&self.qualified_name)
    }

    pub fn scope(&self) -> String {
        names::split_last(&self.qualified_name).0
    }

    pub fn is_operator(&self) -> bool {
        names::is_operator(self.simple_name())
    }

    /// Number of leading parameters without a default argument.
    pub fn required_params(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_none()).count()
    }

    /// Whether this is a copy or move constructor of `class_name`.
    pub fn is_copy_or_move_ctor(&self, class_name: &str) -> bool {
        self.flags.is_constructor
            && self.params.len() == 1
            && self.params[0].ty.is_reference()
            && self.params[0].ty.base().record_name() == Some(class_name)
    }
}

/// An immediate base class edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseEdge {
    /// Fully qualified, template-substituted base name.
    pub name: String,
    pub is_virtual: bool,
    /// Location of the base class declaration.
    pub location: SourceLocation,
}

/// A class, struct or class template (specialization).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDecl {
    /// Qualified name including template arguments for specializations.
    pub qualified_name: String,
    pub template_params: Vec<String>,
    pub template_args: Vec<TemplateArg>,
    pub is_final: bool,
    pub bases: Vec<BaseEdge>,
    /// Members brought in by using-declarations (`::Base::method`).
    pub using_members: Vec<String>,
    /// Bases whose constructors are inherited (`using Base::Base`).
    pub inherited_constructors: Vec<String>,
    pub traits: TypeTraits,
    pub location: SourceLocation,
}

impl ClassDecl {
    /// Name without template arguments.
    pub fn template_name(&self) -> &str {
        match self.qualified_name.find('<') {
            Some(idx) => &self.qualified_name[..idx],
            None => &self.qualified_name,
        }
    }

    /// The class as a record type.
    pub fn as_type(&self) -> NativeType {
        NativeType::record_with_args(self.template_name(), self.template_args.clone())
    }

    /// Constructor name: the final name segment without template arguments.
    pub fn constructor_name(&self) -> &str {
        names::strip_template_args(names::simple_name(self.template_name()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDecl {
    pub qualified_name: String,
    /// Enumerator names in declaration order (unqualified).
    pub enumerators: Vec<String>,
    pub scoped: bool,
    pub location: SourceLocation,
}

impl EnumDecl {
    /// Qualified name of an enumerator: scoped enums qualify by the enum,
    /// unscoped ones by the enclosing scope.
    pub fn qualify_enumerator(&self, enumerator: &str) -> String {
        if self.scoped {
            names::qualify(&self.qualified_name, enumerator)
        } else {
            names::qualify(&names::split_last(&self.qualified_name).0, enumerator)
        }
    }

    pub fn as_type(&self) -> NativeType {
        NativeType::enumeration(self.qualified_name.clone(), self.scoped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumeratorDecl {
    pub qualified_name: String,
    pub enum_name: String,
    pub scoped: bool,
    pub location: SourceLocation,
}

/// A variable or data member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDecl {
    pub qualified_name: String,
    pub ty: NativeType,
    pub is_static: bool,
    pub is_constexpr: bool,
    pub location: SourceLocation,
}

impl VarDecl {
    pub fn is_constant(&self) -> bool {
        self.is_constexpr || self.ty.is_const
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedefDecl {
    pub qualified_name: String,
    pub target: NativeType,
    pub location: SourceLocation,
}

/// Any declaration the oracle can return from a name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeDecl {
    Function(FunctionDecl),
    Class(ClassDecl),
    Enum(EnumDecl),
    Enumerator(EnumeratorDecl),
    Var(VarDecl),
    Typedef(TypedefDecl),
    Namespace(String),
}

impl NativeDecl {
    pub fn qualified_name(&self) -> &str {
        match self {
            NativeDecl::Function(d) => &d.qualified_name,
            NativeDecl::Class(d) => &d.qualified_name,
            NativeDecl::Enum(d) => &d.qualified_name,
            NativeDecl::Enumerator(d) => &d.qualified_name,
            NativeDecl::Var(d) => &d.qualified_name,
            NativeDecl::Typedef(d) => &d.qualified_name,
            NativeDecl::Namespace(name) => name,
        }
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            NativeDecl::Function(d) => Some(&d.location),
            NativeDecl::Class(d) => Some(&d.location),
            NativeDecl::Enum(d) => Some(&d.location),
            NativeDecl::Enumerator(d) => Some(&d.location),
            NativeDecl::Var(d) => Some(&d.location),
            NativeDecl::Typedef(d) => Some(&d.location),
            NativeDecl::Namespace(_) => None,
        }
    }

    /// Human-readable kind, used in wrong-kind diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            NativeDecl::Function(_) => "function",
            NativeDecl::Class(_) => "class",
            NativeDecl::Enum(_) => "enum",
            NativeDecl::Enumerator(_) => "enumerator",
            NativeDecl::Var(_) => "variable",
            NativeDecl::Typedef(_) => "typedef",
            NativeDecl::Namespace(_) => "namespace",
        }
    }
}

/// How a user-defined conversion is provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionVia {
    /// A non-explicit converting constructor of the target.
    Constructor,
    /// A non-explicit conversion function of the source.
    Operator,
}

/// A single user-defined implicit conversion from some source type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub target: NativeType,
    pub via: ConversionVia,
    /// Qualified name of the constructor or conversion function.
    pub declared_by: String,
}
