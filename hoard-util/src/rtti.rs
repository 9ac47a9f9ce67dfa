use std::{any, fmt};

use ahash::{AHashMap, AHashSet};
use once_cell::sync::Lazy;
use parking_lot::RwLock;

#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct TypeId(any::TypeId);

impl TypeId {
    pub fn type_name(self) -> Option<&'static str> {
        type_name_of_id(self)
    }

    #[inline]
    pub fn of<T: 'static>() -> TypeId {
        TypeId(any::TypeId::of::<T>())
    }

    /// Whether `self` is `base` or was registered as a (transitive) subtype of it.
    pub fn is_subtype_of(self, base: TypeId) -> bool {
        self == base || GLOBAL_REGISTRY.read().is_subtype(self, base)
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.type_name() {
            Some(name) => write!(f, "TypeId({})", name),
            None => self.0.fmt(f),
        }
    }
}

impl From<any::TypeId> for TypeId {
    fn from(v: any::TypeId) -> TypeId {
        TypeId(v)
    }
}

impl From<TypeId> for any::TypeId {
    fn from(v: TypeId) -> any::TypeId {
        v.0
    }
}

#[derive(Debug)]
struct TypeInfo {
    type_name: &'static str,
    supertypes: AHashSet<TypeId>,
}

impl TypeInfo {
    fn of<T: 'static>() -> TypeInfo {
        TypeInfo {
            type_name: std::any::type_name::<T>(),
            supertypes: AHashSet::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Registry {
    mapping: AHashMap<TypeId, TypeInfo>,
}

impl Registry {
    fn register<T: 'static>(&mut self) -> &mut TypeInfo {
        self.mapping
            .entry(TypeId::of::<T>())
            .or_insert_with(TypeInfo::of::<T>)
    }

    fn get(&self, ty: TypeId) -> Option<&TypeInfo> {
        self.mapping.get(&ty)
    }

    fn is_subtype(&self, ty: TypeId, base: TypeId) -> bool {
        let mut stack = vec![ty];
        let mut visited = AHashSet::new();

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }

            let info = match self.get(current) {
                Some(v) => v,
                None => continue,
            };

            if info.supertypes.contains(&base) {
                return true;
            }

            stack.extend(info.supertypes.iter().copied());
        }

        false
    }
}

static GLOBAL_REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(Registry::default()));

pub fn register<T: 'static>() {
    let mut registry = GLOBAL_REGISTRY.write();
    registry.register::<T>();
}

/// Records that lookups for `Base` should also accept `Sub`.
pub fn register_subtype<Sub: 'static, Base: 'static>() {
    let mut registry = GLOBAL_REGISTRY.write();
    registry.register::<Base>();
    registry
        .register::<Sub>()
        .supertypes
        .insert(TypeId::of::<Base>());
}

pub fn type_name_of_id(ty: TypeId) -> Option<&'static str> {
    let registry = GLOBAL_REGISTRY.read();
    registry.get(ty).map(|v| v.type_name)
}
