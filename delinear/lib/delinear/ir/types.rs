use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/**
 * First-class types of the IR.
 **/
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Int(u32),
    Float,
    Double,
    Pointer { pointee: Box<Type>, addr_space: u32 },
    // Named struct. The fields live in the module's struct table.
    Struct(String),
    Array(Box<Type>, u64),
}

impl Type {
    pub const I1: Type = Type::Int(1);
    pub const I32: Type = Type::Int(32);
    pub const I64: Type = Type::Int(64);

    pub fn ptr(pointee: Type) -> Type {
        Type::Pointer {
            pointee: Box::new(pointee),
            addr_space: 0,
        }
    }

    pub fn is_integer_ty(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    pub fn is_pointer_ty(&self) -> bool {
        matches!(self, Type::Pointer { .. })
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer { pointee, .. } => Some(pointee.as_ref()),
            _ => None,
        }
    }

    pub fn struct_name(&self) -> Option<&str> {
        match self {
            Type::Struct(name) => Some(name.as_str()),
            _ => None,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Void => f.pad("void"),
            Type::Int(bits) => write!(f, "i{}", bits),
            Type::Float => f.pad("float"),
            Type::Double => f.pad("double"),
            Type::Pointer {
                pointee,
                addr_space: 0,
            } => write!(f, "{}*", pointee),
            Type::Pointer {
                pointee,
                addr_space,
            } => write!(f, "{} addrspace({})*", pointee, addr_space),
            Type::Struct(name) => write!(f, "%{}", name),
            Type::Array(elem, len) => write!(f, "[{} x {}]", len, elem),
        }
    }
}

/**
 * Answers size and alignment questions about types, for a fixed pointer width.
 **/
#[derive(Clone, Debug)]
pub struct DataLayout {
    pub pointer_size: u64,
    pub(crate) structs: HashMap<String, Vec<Type>>,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self {
            pointer_size: 8,
            structs: HashMap::new(),
        }
    }
}

impl DataLayout {
    pub fn new(pointer_size: u64) -> DataLayout {
        DataLayout {
            pointer_size,
            structs: HashMap::new(),
        }
    }

    pub fn define_struct(&mut self, name: &str, fields: Vec<Type>) {
        self.structs.insert(name.to_string(), fields);
    }

    pub fn struct_fields(&self, name: &str) -> Option<&[Type]> {
        self.structs.get(name).map(|x| x.as_slice())
    }

    /// Size in bytes including tail padding, i.e. the distance between two
    /// consecutive elements of this type in an array.
    pub fn type_alloc_size(&self, ty: &Type) -> u64 {
        let size = self.type_store_size(ty);
        align_to(size, self.abi_alignment(ty))
    }

    fn type_store_size(&self, ty: &Type) -> u64 {
        match ty {
            Type::Void => 0,
            Type::Int(bits) => ((*bits as u64) + 7) / 8,
            Type::Float => 4,
            Type::Double => 8,
            Type::Pointer { .. } => self.pointer_size,
            Type::Struct(name) => {
                let fields = self.struct_fields(name).unwrap_or(&[]);
                let size = fields.iter().fold(0, |off, field| {
                    align_to(off, self.abi_alignment(field)) + self.type_alloc_size(field)
                });
                align_to(size, self.abi_alignment(ty))
            }
            Type::Array(elem, len) => self.type_alloc_size(elem) * len,
        }
    }

    pub fn abi_alignment(&self, ty: &Type) -> u64 {
        match ty {
            Type::Void => 1,
            Type::Int(_) => self.type_store_size(ty).next_power_of_two().clamp(1, 8),
            Type::Float => 4,
            Type::Double => 8,
            Type::Pointer { .. } => self.pointer_size,
            Type::Struct(name) => self
                .struct_fields(name)
                .unwrap_or(&[])
                .iter()
                .map(|f| self.abi_alignment(f))
                .max()
                .unwrap_or(1),
            Type::Array(elem, _) => self.abi_alignment(elem),
        }
    }

    /// Byte offset of field `idx` inside struct `name`.
    pub fn struct_field_offset(&self, name: &str, idx: usize) -> Option<u64> {
        let fields = self.struct_fields(name)?;
        if idx >= fields.len() {
            return None;
        }
        let mut off = 0;
        for (i, field) in fields.iter().enumerate() {
            off = align_to(off, self.abi_alignment(field));
            if i == idx {
                return Some(off);
            }
            off += self.type_alloc_size(field);
        }
        None
    }
}

fn align_to(v: u64, align: u64) -> u64 {
    if align <= 1 {
        v
    } else {
        (v + align - 1) / align * align
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_sizes() {
        let dl = DataLayout::default();
        assert_eq!(1, dl.type_alloc_size(&Type::I1));
        assert_eq!(4, dl.type_alloc_size(&Type::I32));
        assert_eq!(8, dl.type_alloc_size(&Type::I64));
        assert_eq!(8, dl.type_alloc_size(&Type::ptr(Type::Float)));
        assert_eq!(4, DataLayout::new(4).type_alloc_size(&Type::ptr(Type::Float)));
        assert_eq!(40, dl.type_alloc_size(&Type::Array(Box::new(Type::Double), 5)));
    }

    #[test]
    fn test_struct_layout() {
        let mut dl = DataLayout::default();
        dl.define_struct("struct.mixed", vec![Type::Int(8), Type::I64, Type::I32]);
        assert_eq!(8, dl.abi_alignment(&Type::Struct("struct.mixed".to_string())));
        assert_eq!(24, dl.type_alloc_size(&Type::Struct("struct.mixed".to_string())));
        assert_eq!(Some(0), dl.struct_field_offset("struct.mixed", 0));
        assert_eq!(Some(8), dl.struct_field_offset("struct.mixed", 1));
        assert_eq!(Some(16), dl.struct_field_offset("struct.mixed", 2));
        assert_eq!(None, dl.struct_field_offset("struct.mixed", 3));
    }
}
