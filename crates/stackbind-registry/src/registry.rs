//! Descriptor registration.

use stackbind_core::{
    Metamethod, MetamethodSet, REGISTRY_INDEX, RegistrationError, State, TypeTag,
};

use crate::{BoundType, MethodClassification, Registration};

/// Register `T` with `state`.
///
/// Builds `T`'s descriptor and stores it in the VM registry under
/// `T::type_name()`. A type can be registered once per state; a second
/// attempt fails with [`RegistrationError::DuplicateType`] and leaves the
/// existing descriptor untouched. The descriptor is only stored once it is
/// complete, so a failed registration leaves nothing behind.
///
/// # Example
///
/// ```ignore
/// let info = register_bound_type::<Counter>(&mut state)?;
/// assert!(info.has_constructor);
/// ```
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn register_bound_type<T: BoundType>(
    state: &mut State,
) -> Result<Registration, RegistrationError> {
    let name = T::type_name();
    if is_registered::<T>(state) {
        return Err(RegistrationError::DuplicateType(name.to_string()));
    }

    let out_of_memory = || RegistrationError::OutOfMemory(name.to_string());
    let entries = T::entries();
    let mut state = state.guard();
    if !state.create_table(0, entries.len() + 2) {
        return Err(out_of_memory());
    }

    let mut registration = Registration {
        name,
        hash: T::type_hash(),
        metamethods: MetamethodSet::empty(),
        methods: 0,
        has_constructor: false,
    };
    for entry in entries {
        match entry.classification {
            MethodClassification::Constructor => registration.has_constructor = true,
            MethodClassification::Instance | MethodClassification::Static => {
                registration.methods += 1;
            }
            MethodClassification::Metamethod(metamethod) => {
                registration.metamethods |= metamethod.flag();
            }
        }
        state.push(entry.function);
        if state.type_of(-1) != TypeTag::Function {
            return Err(out_of_memory());
        }
        state.raw_set_field(-2, entry.name);
    }

    if !registration.has_metamethod(Metamethod::Index) {
        state.push_copy(-1);
        state.raw_set_field(-2, Metamethod::Index.name());
    }
    state.push_string(name);
    state.raw_set_field(-2, "__type");

    state.raw_set_field(REGISTRY_INDEX, name);
    Ok(registration)
}

/// Whether a descriptor named `T::type_name()` exists in `state`.
pub fn is_registered<T: BoundType>(state: &State) -> bool {
    state.find_metatable(T::type_name()).is_some()
}

/// Push `T`'s descriptor. Pushes nil and returns false if `T` is not
/// registered.
pub fn push_descriptor<T: BoundType>(state: &mut State) -> bool {
    state.get_metatable_named(T::type_name()) == TypeTag::Table
}
