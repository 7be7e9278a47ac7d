use stackbind_core::{Any, Metamethod, MetamethodSet, NativeFunction, TypeHash};

/// How a declaration of a bound type is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodClassification {
    /// Creates an instance; installed as `new`.
    Constructor,
    /// Takes the instance as its first argument.
    Instance,
    /// Takes no instance.
    Static,
    /// Fills a reserved operator slot.
    Metamethod(Metamethod),
}

/// A function installed in a type's descriptor.
#[derive(Debug, Clone)]
pub struct BoundEntry {
    /// Descriptor field name.
    pub name: &'static str,
    /// How the entry was classified.
    pub classification: MethodClassification,
    /// The trampoline.
    pub function: NativeFunction,
}

impl BoundEntry {
    pub fn constructor(function: NativeFunction) -> Self {
        Self {
            name: "new",
            classification: MethodClassification::Constructor,
            function,
        }
    }

    pub fn instance(name: &'static str, function: NativeFunction) -> Self {
        Self {
            name,
            classification: MethodClassification::Instance,
            function,
        }
    }

    pub fn static_method(name: &'static str, function: NativeFunction) -> Self {
        Self {
            name,
            classification: MethodClassification::Static,
            function,
        }
    }

    pub fn metamethod(metamethod: Metamethod, function: NativeFunction) -> Self {
        Self {
            name: metamethod.name(),
            classification: MethodClassification::Metamethod(metamethod),
            function,
        }
    }
}

/// A host type exposed to the VM as a native object type.
///
/// Implemented by `#[methods]`; hand-written impls work the same way.
pub trait BoundType: Any + Sized {
    /// The descriptor entries, in declaration order.
    fn entries() -> Vec<BoundEntry>;

    /// Run when an instance is collected or the state is dropped.
    fn destructor() -> Option<fn(&mut Self)> {
        None
    }
}

/// Summary of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Registry key of the descriptor.
    pub name: &'static str,
    /// Tag carried by instances.
    pub hash: TypeHash,
    /// Occupied metamethod slots.
    pub metamethods: MetamethodSet,
    /// Number of named instance and static methods.
    pub methods: usize,
    /// Whether `new` is installed.
    pub has_constructor: bool,
}

impl Registration {
    /// Whether the type supplies `metamethod`.
    pub fn has_metamethod(&self, metamethod: Metamethod) -> bool {
        self.metamethods.contains(metamethod.flag())
    }
}
