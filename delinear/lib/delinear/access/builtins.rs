use crate::ir::Function;
use bitflags::bitflags;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

bitflags! {
    /**
     * The grid axes that drive one array dimension.
     **/
    #[derive(Default)]
    pub struct GridAxisMask: u8 {
        const X = 0b0000_0001;
        const Y = 0b0000_0010;
        const Z = 0b0000_0100;
    }
}

static_assertions::const_assert_eq!(GridAxisMask::all().bits(), 0b111);

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndexKind {
    ThreadId,
    BlockId,
    BlockSize,
}

/**
 * A special register holding one coordinate of the launch geometry.
 **/
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct IndexRegister {
    pub kind: IndexKind,
    pub axis: Axis,
}

/// Which index registers contribute to the grid-axis mask of a dimension.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum MaskPolicy {
    /// Only block indices mark an axis.
    #[default]
    BlockIndex,
    /// Block and thread indices both mark their axis.
    AnyIndex,
}

/**
 * Names of the builtins recognized by the formula builders, i.e. the index
 * registers of the target and the entry points of the array runtime.
 **/
#[derive(Clone, Debug)]
pub struct BuiltinTable {
    registers: HashMap<String, IndexRegister>,
    // Demangled prefix of every array method
    pub array_class: String,
    pub access_operator: String,
    pub dim_accessor: String,
    // Raw-name markers of calls returning array storage
    pub runtime_namespace: String,
    pub storage_markers: Vec<String>,
    pub addrspace_conversion_prefix: String,
    pub offset_prefix: String,
    pub offset_struct: String,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn from_index(idx: i64) -> Option<Axis> {
        usize::try_from(idx).ok().and_then(|i| Axis::ALL.get(i).copied())
    }

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn mask(self) -> GridAxisMask {
        match self {
            Axis::X => GridAxisMask::X,
            Axis::Y => GridAxisMask::Y,
            Axis::Z => GridAxisMask::Z,
        }
    }
}

impl Display for Axis {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        };
        write!(f, "{}", name)
    }
}

impl GridAxisMask {
    /// The axes present in the mask, X first.
    pub fn axes(self) -> impl Iterator<Item = Axis> {
        Axis::ALL.into_iter().filter(move |a| self.contains(a.mask()))
    }
}

impl Display for GridAxisMask {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, axis) in self.axes().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", axis.to_string().to_uppercase())?;
        }
        write!(f, "}}")
    }
}

impl Display for IndexRegister {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.kind {
            IndexKind::ThreadId => "t",
            IndexKind::BlockId => "b",
            IndexKind::BlockSize => "bsize",
        };
        write!(f, "{}.{}", prefix, self.axis)
    }
}

impl MaskPolicy {
    /// The axis bits a use of `reg` contributes.
    pub fn mask_of(self, reg: IndexRegister) -> GridAxisMask {
        match (self, reg.kind) {
            (_, IndexKind::BlockId) | (MaskPolicy::AnyIndex, IndexKind::ThreadId) => reg.axis.mask(),
            _ => GridAxisMask::empty(),
        }
    }
}

impl Default for BuiltinTable {
    fn default() -> Self {
        BuiltinTable::nvptx()
    }
}

impl BuiltinTable {
    pub fn nvptx() -> BuiltinTable {
        let mut registers = HashMap::new();
        for (sreg, kind) in [
            ("tid", IndexKind::ThreadId),
            ("ctaid", IndexKind::BlockId),
            ("ntid", IndexKind::BlockSize),
        ] {
            for axis in Axis::ALL {
                registers.insert(
                    format!("llvm.nvvm.read.ptx.sreg.{}.{}", sreg, axis),
                    IndexRegister { kind, axis },
                );
            }
        }
        BuiltinTable {
            registers,
            array_class: "cudarrays::dynarray".to_string(),
            access_operator: "operator()".to_string(),
            dim_accessor: "get_dim".to_string(),
            runtime_namespace: "cudarrays".to_string(),
            storage_markers: vec!["array_storage".to_string(), "dynarray".to_string()],
            addrspace_conversion_prefix: "llvm.nvvm.ptr.gen.to.".to_string(),
            offset_prefix: "offset".to_string(),
            offset_struct: "dim3".to_string(),
        }
    }

    /// Look up an index register by the link name of the function reading it.
    pub fn register(&self, name: &str) -> Option<IndexRegister> {
        self.registers.get(name).copied()
    }

    /// An element access `arr(i, j, ...)` that returns, as opposed to a
    /// bounds-check failure path.
    pub fn is_array_access(&self, callee: &Function) -> bool {
        let name = callee.demangled_name();
        name.starts_with(&self.array_class)
            && name.contains(&self.access_operator)
            && !callee.does_not_return()
    }

    pub fn is_dim_accessor(&self, callee: &Function) -> bool {
        let name = callee.demangled_name();
        name.starts_with(&self.array_class) && name.contains(&self.dim_accessor)
    }

    /// A runtime call whose result points into the storage of an array.
    pub fn is_storage_call(&self, callee: &Function) -> bool {
        callee.name.contains(&self.runtime_namespace)
            && self.storage_markers.iter().any(|m| callee.name.contains(m))
    }

    pub fn is_addrspace_conversion(&self, callee: &Function) -> bool {
        callee.name.starts_with(&self.addrspace_conversion_prefix) && callee.params.len() == 1
    }

    pub fn is_offset_global(&self, name: &str) -> bool {
        name.starts_with(&self.offset_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionAttrs, Param, Type};

    #[test]
    fn test_register_table() {
        let table = BuiltinTable::nvptx();
        let reg = table.register("llvm.nvvm.read.ptx.sreg.ctaid.y").unwrap();
        assert_eq!(IndexKind::BlockId, reg.kind);
        assert_eq!("b.y", reg.to_string());
        assert_eq!("t.z", table.register("llvm.nvvm.read.ptx.sreg.tid.z").unwrap().to_string());
        assert_eq!(
            "bsize.x",
            table.register("llvm.nvvm.read.ptx.sreg.ntid.x").unwrap().to_string()
        );
        assert!(table.register("llvm.nvvm.read.ptx.sreg.nctaid.x").is_none());
    }

    #[test]
    fn test_mask_policy() {
        let tid_y = IndexRegister {
            kind: IndexKind::ThreadId,
            axis: Axis::Y,
        };
        let bid_z = IndexRegister {
            kind: IndexKind::BlockId,
            axis: Axis::Z,
        };
        assert_eq!(GridAxisMask::empty(), MaskPolicy::BlockIndex.mask_of(tid_y));
        assert_eq!(GridAxisMask::Y, MaskPolicy::AnyIndex.mask_of(tid_y));
        assert_eq!(GridAxisMask::Z, MaskPolicy::BlockIndex.mask_of(bid_z));
        assert_eq!(
            vec![Axis::X, Axis::Z],
            (GridAxisMask::X | GridAxisMask::Z).axes().collect::<Vec<_>>()
        );
        assert_eq!("{X,Z}", (GridAxisMask::X | GridAxisMask::Z).to_string());
        assert_eq!(Some(Axis::Z), Axis::from_index(2));
        assert_eq!(None, Axis::from_index(3));
    }

    #[test]
    fn test_array_api_names() {
        let table = BuiltinTable::nvptx();
        let mut access = Function::declare("_ZN9cudarrays7dynarrayclEii", vec![], Type::I64);
        access.demangled = Some("cudarrays::dynarray<float, 2u>::operator()(int, int)".to_string());
        assert!(table.is_array_access(&access));
        assert!(!table.is_dim_accessor(&access));
        access.attrs = FunctionAttrs::NO_RETURN;
        assert!(!table.is_array_access(&access));

        let conv = Function::declare(
            "llvm.nvvm.ptr.gen.to.local.p5i8.p0i8",
            vec![Param {
                name: "p".to_string(),
                ty: Type::ptr(Type::Int(8)),
            }],
            Type::ptr(Type::Int(8)),
        );
        assert!(table.is_addrspace_conversion(&conv));
        let storage = Function::declare("_ZN9cudarrays13array_storage4dataEv", vec![], Type::Void);
        assert!(table.is_storage_call(&storage));
    }
}
