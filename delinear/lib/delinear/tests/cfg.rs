// IR fixtures shared by the unit tests. The function under test is always the
// last function of the module; everything before it is a declaration.

use crate::ir::{
    BinaryOperator, CmpPredicate, Constant, ConstantExprKind, Function, FunctionBuilder, InstKind,
    Module, Param, Type, Value,
};

fn param(name: &str, ty: Type) -> Param {
    Param {
        name: name.to_string(),
        ty,
    }
}

fn dynarray_ty() -> Type {
    Type::Struct("class.cudarrays::dynarray".to_string())
}

fn declare(m: &mut Module, name: &str, demangled: Option<&str>, params: Vec<Param>, ret_ty: Type) -> usize {
    if let Some(idx) = m.function_by_name(name) {
        return idx;
    }
    let mut f = Function::declare(name, params, ret_ty);
    f.demangled = demangled.map(|x| x.to_string());
    m.add_function(f)
}

/// `llvm.nvvm.read.ptx.sreg.<sreg>.<axis>`
fn sreg(m: &mut Module, sreg: &str, axis: &str) -> usize {
    let name = format!("llvm.nvvm.read.ptx.sreg.{}.{}", sreg, axis);
    declare(m, &name, None, vec![], Type::I32)
}

/// `cudarrays::dynarray<float, 2u>::operator()` with `dims` indices.
fn access_operator(m: &mut Module, dims: usize) -> usize {
    let name = format!("_ZN9cudarrays8dynarrayIfLj2EEclE{}", "i".repeat(dims));
    let demangled = format!(
        "cudarrays::dynarray<float, 2u>::operator()({})",
        vec!["int"; dims].join(", ")
    );
    let mut params = vec![param("this", Type::ptr(dynarray_ty()))];
    params.extend((0..dims).map(|i| param(&format!("i{}", i), Type::I32)));
    declare(m, &name, Some(&demangled), params, Type::ptr(Type::Float))
}

fn call(b: &mut FunctionBuilder, callee: usize, args: &[Value]) -> Value {
    b.call(callee, Type::I32, args)
}

fn finish(mut m: Module, b: FunctionBuilder) -> Module {
    m.add_function(b.finish());
    m
}

pub(crate) struct LoopValues {
    pub iv: Value,
    pub next: Value,
    pub bound: Value,
}

pub(crate) struct StridedValues {
    pub ptr: Value,
}

pub(crate) struct SelectValues {
    pub max: Value,
    pub shl: Value,
}

pub(crate) struct NestedValues {
    pub inner_iv: Value,
    pub outer_iv: Value,
}

pub(crate) struct IndexValues {
    pub global_x: Value,
    pub rem: Value,
    pub shl: Value,
    pub and: Value,
    pub cmp: Value,
    pub xor: Value,
}

pub(crate) struct PhiValues {
    pub merge: Value,
    pub counter: Value,
}

pub(crate) struct ConstantValues {
    pub offset: Value,
    pub offset_y: Value,
    pub other_global: Value,
    // Constant GEP off a global other than `offset`
    pub other_expr: Value,
    pub block_offset: Value,
    pub get_dim: Value,
    pub element: Value,
    pub other_call: Value,
    pub slot: Value,
    pub null: Value,
    pub select: Value,
}

// Instruction indices of the interesting parts of a kernel
pub(crate) struct KernelSites {
    pub slot: usize,
    pub read: usize,
    pub write: usize,
}

pub(crate) struct InconsistentSites {
    pub first: usize,
    pub second: usize,
}

pub(crate) struct LoopKernelSites {
    pub site: usize,
}

fn site(v: Value) -> usize {
    v.as_instruction().expect("not an instruction")
}

pub(crate) fn empty_kernel_module() -> Module {
    let m = Module::new("empty");
    let mut b = FunctionBuilder::new("empty", vec![param("a", Type::ptr(Type::Float))], Type::Void);
    b.block("entry");
    b.ret(None);
    finish(m, b)
}

/**
 * for (i = 0; ; ) { next = i + 1; if (!(next <pred> bound)) break; i = next; }
 * The exit test sits at the bottom of the single loop block.
 **/
fn single_block_loop(params: Vec<Param>, bound: Value, pred: CmpPredicate, step: i64) -> (Module, LoopValues, Option<Value>) {
    let m = Module::new("loop");
    let has_array = params.first().map_or(false, |p| p.ty.is_pointer_ty());
    let mut b = FunctionBuilder::new("loop", params, Type::Void);
    let entry = b.block("entry");
    let body = b.block("body");
    let exit = b.block("exit");
    b.switch_to(entry);
    b.br(body);

    b.switch_to(body);
    let iv = b.phi(Type::I32);
    let ptr = has_array.then(|| b.gep(Type::ptr(Type::Float), Value::Argument(0), &[iv]));
    let next = b.binary(BinaryOperator::Add, Type::I32, iv, Value::int(step));
    let cmp = b.icmp(pred, next, bound);
    b.cond_br(cmp, body, exit);
    b.add_incoming(iv, entry, Value::int(0));
    b.add_incoming(iv, body, next);

    b.switch_to(exit);
    b.ret(None);
    (finish(m, b), LoopValues { iv, next, bound }, ptr)
}

pub(crate) fn counted_loop(pred: CmpPredicate) -> (Module, LoopValues) {
    let (m, values, _) = single_block_loop(vec![param("n", Type::I32)], Value::Argument(0), pred, 1);
    (m, values)
}

pub(crate) fn constant_loop(n: i64) -> (Module, LoopValues) {
    let (m, values, _) = single_block_loop(vec![], Value::int(n), CmpPredicate::Slt, 1);
    (m, values)
}

/// `a[i]` with `i += k`
pub(crate) fn strided_loop(k: i64) -> (Module, StridedValues) {
    let params = vec![param("a", Type::ptr(Type::Float)), param("n", Type::I32)];
    let (m, _, ptr) = single_block_loop(params, Value::Argument(1), CmpPredicate::Slt, k);
    (
        m,
        StridedValues {
            ptr: ptr.expect("no address computation"),
        },
    )
}

/// `for (p = a; i < n; i++) p += k;`, the pointer itself is the induction variable.
pub(crate) fn pointer_walk(k: i64) -> (Module, StridedValues) {
    let m = Module::new("walk");
    let params = vec![param("a", Type::ptr(Type::Float)), param("n", Type::I32)];
    let mut b = FunctionBuilder::new("walk", params, Type::Void);
    let entry = b.block("entry");
    let body = b.block("body");
    let exit = b.block("exit");
    b.switch_to(entry);
    b.br(body);

    b.switch_to(body);
    let ptr = b.phi(Type::ptr(Type::Float));
    let iv = b.phi(Type::I32);
    let advanced = b.gep(Type::ptr(Type::Float), ptr, &[Value::int(k)]);
    let next = b.binary(BinaryOperator::Add, Type::I32, iv, Value::int(1));
    let cmp = b.icmp(CmpPredicate::Slt, next, Value::Argument(1));
    b.cond_br(cmp, body, exit);
    b.add_incoming(ptr, entry, Value::Argument(0));
    b.add_incoming(ptr, body, advanced);
    b.add_incoming(iv, entry, Value::int(0));
    b.add_incoming(iv, body, next);

    b.switch_to(exit);
    b.ret(None);
    (finish(m, b), StridedValues { ptr })
}

/**
 * for (i = 0; i < n; ) { if (c) i += 1; else i += 2; }
 * Both arms branch back to the header, so the loop has no single latch.
 **/
pub(crate) fn two_latch_loop() -> (Module, LoopValues) {
    let m = Module::new("two_latch");
    let params = vec![param("n", Type::I32), param("c", Type::I1)];
    let mut b = FunctionBuilder::new("two_latch", params, Type::Void);
    let entry = b.block("entry");
    let header = b.block("header");
    let body = b.block("body");
    let left = b.block("left");
    let right = b.block("right");
    let exit = b.block("exit");
    b.switch_to(entry);
    b.br(header);

    b.switch_to(header);
    let iv = b.phi(Type::I32);
    let cmp = b.icmp(CmpPredicate::Slt, iv, Value::Argument(0));
    b.cond_br(cmp, body, exit);
    b.switch_to(body);
    b.cond_br(Value::Argument(1), left, right);
    b.switch_to(left);
    let next = b.binary(BinaryOperator::Add, Type::I32, iv, Value::int(1));
    b.br(header);
    b.switch_to(right);
    let skip = b.binary(BinaryOperator::Add, Type::I32, iv, Value::int(2));
    b.br(header);
    b.add_incoming(iv, entry, Value::int(0));
    b.add_incoming(iv, left, next);
    b.add_incoming(iv, right, skip);

    b.switch_to(exit);
    b.ret(None);
    (
        finish(m, b),
        LoopValues {
            iv,
            next,
            bound: Value::Argument(0),
        },
    )
}

/// A loop whose latch branches back unconditionally.
pub(crate) fn endless_loop() -> (Module, LoopValues) {
    let m = Module::new("endless");
    let mut b = FunctionBuilder::new("endless", vec![], Type::Void);
    let entry = b.block("entry");
    let body = b.block("body");
    b.switch_to(entry);
    b.br(body);
    b.switch_to(body);
    let iv = b.phi(Type::I32);
    let next = b.binary(BinaryOperator::Add, Type::I32, iv, Value::int(1));
    b.br(body);
    b.add_incoming(iv, entry, Value::int(0));
    b.add_incoming(iv, body, next);
    let bound = Value::Constant(Constant::Undef);
    (finish(m, b), LoopValues { iv, next, bound })
}

/**
 * for (i = 0; i + 2 < 7; i += 2)
 *   for (j = 0; j + 1 < 16; j++)
 *     idx = j + blockIdx.y;
 **/
pub(crate) fn nested_loops() -> (Module, NestedValues) {
    let mut m = Module::new("nested");
    let ctaid_y = sreg(&mut m, "ctaid", "y");
    let mut b = FunctionBuilder::new("nested", vec![], Type::Void);
    let entry = b.block("entry");
    let outer = b.block("outer");
    let inner = b.block("inner");
    let latch = b.block("outer.latch");
    let exit = b.block("exit");

    b.switch_to(entry);
    let by = call(&mut b, ctaid_y, &[]);
    b.br(outer);

    b.switch_to(outer);
    let i = b.phi(Type::I32);
    b.br(inner);

    b.switch_to(inner);
    let j = b.phi(Type::I32);
    let idx = b.binary(BinaryOperator::Add, Type::I32, j, by);
    let j_next = b.binary(BinaryOperator::Add, Type::I32, j, Value::int(1));
    let inner_cmp = b.icmp(CmpPredicate::Slt, j_next, Value::int(16));
    b.cond_br(inner_cmp, inner, latch);
    b.add_incoming(j, outer, Value::int(0));
    b.add_incoming(j, inner, j_next);

    b.switch_to(latch);
    let i_next = b.binary(BinaryOperator::Add, Type::I32, i, Value::int(2));
    let outer_cmp = b.icmp(CmpPredicate::Slt, i_next, Value::int(7));
    b.cond_br(outer_cmp, outer, exit);
    b.add_incoming(i, entry, Value::int(0));
    b.add_incoming(i, latch, i_next);

    b.switch_to(exit);
    b.ret(None);
    (
        finish(m, b),
        NestedValues {
            inner_iv: idx,
            outer_iv: i,
        },
    )
}

pub(crate) fn select_max() -> (Module, SelectValues) {
    let m = Module::new("select");
    let params = vec![param("a", Type::I32), param("b", Type::I32)];
    let mut b = FunctionBuilder::new("select", params, Type::I32);
    b.block("entry");
    let (x, y) = (Value::Argument(0), Value::Argument(1));
    let cmp = b.icmp(CmpPredicate::Sgt, x, y);
    let max = b.push(
        Type::I32,
        InstKind::Select {
            cond: cmp,
            on_true: x,
            on_false: y,
        },
    );
    let shl = b.binary(BinaryOperator::Shl, Type::I32, x, Value::int(3));
    b.ret(Some(max));
    (finish(m, b), SelectValues { max, shl })
}

pub(crate) fn index_expressions() -> (Module, IndexValues) {
    let mut m = Module::new("index");
    let ctaid_x = sreg(&mut m, "ctaid", "x");
    let ntid_x = sreg(&mut m, "ntid", "x");
    let tid_x = sreg(&mut m, "tid", "x");
    let tid_y = sreg(&mut m, "tid", "y");

    let mut b = FunctionBuilder::new("index", vec![param("n", Type::I32)], Type::Void);
    b.block("entry");
    let n = Value::Argument(0);
    let bx = call(&mut b, ctaid_x, &[]);
    let bsize = call(&mut b, ntid_x, &[]);
    let tx = call(&mut b, tid_x, &[]);
    let ty = call(&mut b, tid_y, &[]);
    let base = b.binary(BinaryOperator::Mul, Type::I32, bx, bsize);
    let global_x = b.binary(BinaryOperator::Add, Type::I32, base, tx);
    let rem = b.binary(BinaryOperator::SRem, Type::I32, ty, Value::int(4));
    let shl = b.binary(BinaryOperator::Shl, Type::I32, n, Value::int(2));
    let and = b.binary(BinaryOperator::And, Type::I32, ty, Value::int(7));
    let cmp = b.icmp(CmpPredicate::Sle, n, ty);
    let xor = b.binary(BinaryOperator::Xor, Type::I32, ty, Value::int(1));
    b.ret(None);
    (
        finish(m, b),
        IndexValues {
            global_x,
            rem,
            shl,
            and,
            cmp,
            xor,
        },
    )
}

/**
 * `merge` joins blockIdx.x and the parameter from two branches; `counter` is
 * a loop counter feeding itself.
 **/
pub(crate) fn phi_merge() -> (Module, PhiValues) {
    let mut m = Module::new("phi");
    let ctaid_x = sreg(&mut m, "ctaid", "x");
    let mut b = FunctionBuilder::new("phi", vec![param("a", Type::I32)], Type::Void);
    let entry = b.block("entry");
    let left = b.block("left");
    let right = b.block("right");
    let join = b.block("join");
    let body = b.block("body");
    let exit = b.block("exit");
    let a = Value::Argument(0);

    b.switch_to(entry);
    let bx = call(&mut b, ctaid_x, &[]);
    let c = b.icmp(CmpPredicate::Slt, a, Value::int(0));
    b.cond_br(c, left, right);
    b.switch_to(left);
    b.br(join);
    b.switch_to(right);
    b.br(join);

    b.switch_to(join);
    let merge = b.phi(Type::I32);
    b.add_incoming(merge, left, bx);
    b.add_incoming(merge, right, a);
    b.br(body);

    b.switch_to(body);
    let counter = b.phi(Type::I32);
    let next = b.binary(BinaryOperator::Add, Type::I32, counter, Value::int(1));
    let c = b.icmp(CmpPredicate::Slt, next, a);
    b.cond_br(c, body, exit);
    b.add_incoming(counter, join, Value::int(0));
    b.add_incoming(counter, body, next);

    b.switch_to(exit);
    b.ret(None);
    (finish(m, b), PhiValues { merge, counter })
}

pub(crate) fn offsets_and_calls() -> (Module, ConstantValues) {
    let mut m = Module::new("constants");
    m.data_layout
        .define_struct("struct.dim3", vec![Type::I32, Type::I32, Type::I32]);
    let offset = m.add_global("offset", Type::Struct("struct.dim3".to_string()));
    let offset_y = m.add_const_expr(
        ConstantExprKind::GetElementPtr,
        vec![offset, Value::int(0), Value::int(1)],
    );
    let other_global = m.add_global("scale", Type::I32);
    let other_expr = m.add_const_expr(
        ConstantExprKind::GetElementPtr,
        vec![other_global, Value::int(0), Value::int(2)],
    );

    let get_dim = declare(
        &mut m,
        "_ZNK9cudarrays8dynarrayIfLj2EE7get_dimEj",
        Some("cudarrays::dynarray<float, 2u>::get_dim(unsigned int) const"),
        vec![param("this", Type::ptr(dynarray_ty())), param("dim", Type::I32)],
        Type::I32,
    );
    let access = access_operator(&mut m, 2);
    let helper = declare(&mut m, "_Z6helperi", Some("helper(int)"), vec![param("x", Type::I32)], Type::I32);

    let params = vec![
        param("blk_off", Type::Struct("struct.dim3".to_string())),
        param("arr", Type::ptr(dynarray_ty())),
    ];
    let mut b = FunctionBuilder::new("constants", params, Type::Void);
    b.block("entry");
    let arr = Value::Argument(1);
    let block_offset = b.push(
        Type::I32,
        InstKind::ExtractValue {
            aggregate: Value::Argument(0),
            indices: smallvec::smallvec![2],
        },
    );
    let dim = call(&mut b, get_dim, &[arr, Value::int(1)]);
    let element = b.call(access, Type::ptr(Type::Float), &[arr, Value::int(0), Value::int(0)]);
    let other_call = call(&mut b, helper, &[Value::int(3)]);
    let slot = b.alloca("tmp", Type::I32);
    let cmp = b.icmp(CmpPredicate::Eq, block_offset, Value::int(0));
    let select = b.push(
        Type::I32,
        InstKind::Select {
            cond: cmp,
            on_true: block_offset,
            on_false: dim,
        },
    );
    b.ret(None);
    (
        finish(m, b),
        ConstantValues {
            offset,
            offset_y,
            other_global,
            other_expr,
            block_offset,
            get_dim: dim,
            element,
            other_call,
            slot,
            null: Value::Constant(Constant::Null),
            select,
        },
    )
}

const GRID_KERNEL: (&str, &str) = (
    "_Z11grid_kernelN9cudarrays8dynarrayIfLj2EEE",
    "grid_kernel(cudarrays::dynarray<float, 2u>)",
);

/**
 * The array object is copied to a stack slot, then accessed as
 * `arr(blockIdx.x, <second>)` once for reading and once for writing.
 **/
fn slot_kernel(name: (&str, &str), second: impl FnOnce(&mut FunctionBuilder, Value) -> Value) -> (Module, KernelSites) {
    let mut m = Module::new("kernel");
    let ctaid_x = sreg(&mut m, "ctaid", "x");
    let tid_y = sreg(&mut m, "tid", "y");
    let access = access_operator(&mut m, 2);

    let mut b = FunctionBuilder::new(name.0, vec![param("arr", Type::ptr(dynarray_ty()))], Type::Void)
        .demangled(name.1);
    b.block("entry");
    let slot = b.alloca("arr.addr", Type::ptr(dynarray_ty()));
    b.store(Value::Argument(0), slot);
    let bx = call(&mut b, ctaid_x, &[]);
    let ty = call(&mut b, tid_y, &[]);
    let idx = second(&mut b, ty);
    let read = b.call(access, Type::ptr(Type::Float), &[slot, bx, idx]);
    let v = b.load(Type::Float, read);
    let write = b.call(access, Type::ptr(Type::Float), &[slot, bx, idx]);
    b.store(v, write);
    b.ret(None);
    (
        finish(m, b),
        KernelSites {
            slot: site(slot),
            read: site(read),
            write: site(write),
        },
    )
}

/// `arr(blockIdx.x, threadIdx.y)`, read and written.
pub(crate) fn grid_kernel() -> (Module, KernelSites) {
    slot_kernel(GRID_KERNEL, |_, ty| ty)
}

/// The second index is `threadIdx.y ^ 1`, which has no formula.
pub(crate) fn unsupported_index_kernel() -> (Module, KernelSites) {
    slot_kernel(
        ("_Z10bad_kernelN9cudarrays8dynarrayIfLj2EEE", "bad_kernel(cudarrays::dynarray<float, 2u>)"),
        |b, ty| b.binary(BinaryOperator::Xor, Type::I32, ty, Value::int(1)),
    )
}

/// The second index `threadIdx.y + (threadIdx.y ^ 1)` fails after `t.y` was rendered.
pub(crate) fn late_failure_kernel() -> (Module, KernelSites) {
    slot_kernel(
        ("_Z11late_kernelN9cudarrays8dynarrayIfLj2EEE", "late_kernel(cudarrays::dynarray<float, 2u>)"),
        |b, ty| {
            let flipped = b.binary(BinaryOperator::Xor, Type::I32, ty, Value::int(1));
            b.binary(BinaryOperator::Add, Type::I32, ty, flipped)
        },
    )
}

/// The same array accessed with two and with one index.
pub(crate) fn inconsistent_kernel() -> (Module, InconsistentSites) {
    let mut m = Module::new("kernel");
    let ctaid_x = sreg(&mut m, "ctaid", "x");
    let tid_y = sreg(&mut m, "tid", "y");
    let access2 = access_operator(&mut m, 2);
    let access1 = access_operator(&mut m, 1);

    let mut b = FunctionBuilder::new(GRID_KERNEL.0, vec![param("arr", Type::ptr(dynarray_ty()))], Type::Void)
        .demangled(GRID_KERNEL.1);
    b.block("entry");
    let slot = b.alloca("arr.addr", Type::ptr(dynarray_ty()));
    b.store(Value::Argument(0), slot);
    let bx = call(&mut b, ctaid_x, &[]);
    let ty = call(&mut b, tid_y, &[]);
    let first = b.call(access2, Type::ptr(Type::Float), &[slot, bx, ty]);
    b.load(Type::Float, first);
    let second = b.call(access1, Type::ptr(Type::Float), &[slot, bx]);
    b.load(Type::Float, second);
    b.ret(None);
    (
        finish(m, b),
        InconsistentSites {
            first: site(first),
            second: site(second),
        },
    )
}

/// `for (i = 0; i + 1 < n; i++) v = arr(blockIdx.y, i);` with the array parameter used directly.
pub(crate) fn loop_kernel() -> (Module, LoopKernelSites) {
    let mut m = Module::new("kernel");
    let ctaid_y = sreg(&mut m, "ctaid", "y");
    let access = access_operator(&mut m, 2);

    let params = vec![param("n", Type::I32), param("arr", Type::ptr(dynarray_ty()))];
    let mut b = FunctionBuilder::new("_Z11loop_kerneliN9cudarrays8dynarrayIfLj2EEE", params, Type::Void)
        .demangled("loop_kernel(int, cudarrays::dynarray<float, 2u>)");
    let entry = b.block("entry");
    let body = b.block("body");
    let exit = b.block("exit");

    b.switch_to(entry);
    let by = call(&mut b, ctaid_y, &[]);
    b.br(body);

    b.switch_to(body);
    let i = b.phi(Type::I32);
    let access_site = b.call(access, Type::ptr(Type::Float), &[Value::Argument(1), by, i]);
    b.load(Type::Float, access_site);
    let next = b.binary(BinaryOperator::Add, Type::I32, i, Value::int(1));
    let cmp = b.icmp(CmpPredicate::Slt, next, Value::Argument(0));
    b.cond_br(cmp, body, exit);
    b.add_incoming(i, entry, Value::int(0));
    b.add_incoming(i, body, next);

    b.switch_to(exit);
    b.ret(None);
    (
        finish(m, b),
        LoopKernelSites {
            site: site(access_site),
        },
    )
}
