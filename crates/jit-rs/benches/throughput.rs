//! Performance benchmarks for `jit_rs`.
//!
//! Measures:
//! - Single instruction encode latency
//! - Memory-operand encode latency (ModR/M + SIB + displacement)
//! - Expression lowering (including the divide preservation dance)
//! - Whole compile pipeline throughput
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use jit_rs::operand::{Immediate, MemoryAddress, Width, EAX, ECX, EDI, ESI, RAX, RBX, RCX, RDX};
use jit_rs::{asm, compile, Compiler, Expr, IrType, Operand, RegClass};

// ─── Encode latency ──────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    group.bench_function("mov_reg_reg", |b| {
        b.iter(|| asm::mov(black_box(RAX), black_box(RBX)).encode().unwrap())
    });

    group.bench_function("mov_reg_imm", |b| {
        b.iter(|| asm::mov_imm(black_box(RAX), black_box(0x1234)).encode().unwrap())
    });

    group.bench_function("add_reg_imm8", |b| {
        b.iter(|| {
            asm::add(black_box(RAX), black_box(Immediate::imm32(16)))
                .encode()
                .unwrap()
        })
    });

    group.bench_function("mov_mem_sib_disp", |b| {
        let mem = MemoryAddress::base_index(Width::Quad, RAX, RCX, 8, 0x10);
        b.iter(|| asm::mov(black_box(mem), black_box(RDX)).encode().unwrap())
    });

    group.bench_function("idiv", |b| {
        b.iter(|| asm::idiv(black_box(RCX)).encode().unwrap())
    });

    group.finish();
}

// ─── Lowering ────────────────────────────────────────────────────────

fn divide_expr() -> Expr {
    Expr::Div(
        Box::new(Expr::var("a", IrType::U32)),
        Box::new(Expr::var("b", IrType::U32)),
    )
}

fn nested_expr() -> Expr {
    // (a+b)*(a-b) / (b+1)
    let a = || Expr::var("a", IrType::U32);
    let b = || Expr::var("b", IrType::U32);
    Expr::Div(
        Box::new(Expr::Mul(
            Box::new(Expr::Add(Box::new(a()), Box::new(b()))),
            Box::new(Expr::Sub(Box::new(a()), Box::new(b()))),
        )),
        Box::new(Expr::Add(Box::new(b()), Box::new(Expr::int(IrType::U32, 1)))),
    )
}

fn bench_lowering(c: &mut Criterion) {
    let mut group = c.benchmark_group("lowering");

    group.bench_function("divide_with_preservation", |b| {
        b.iter(|| {
            let mut compiler = Compiler::new();
            compiler.bind("a", EDI).bind("b", ESI);
            // Keep rAX live so the preservation path runs.
            compiler.bind("keep", EAX);
            compiler.context().mark_occupied(RegClass::General, 1);
            compiler
                .lower(black_box(&divide_expr()), Operand::Register(ECX))
                .unwrap();
            compiler.finish().unwrap()
        })
    });

    group.bench_function("nested_arithmetic", |b| {
        b.iter(|| {
            let mut compiler = Compiler::new();
            compiler.bind("a", EDI).bind("b", ESI);
            compiler.context().mark_occupied(RegClass::General, 0);
            compiler.lower(black_box(&nested_expr()), EAX).unwrap();
            compiler.finish().unwrap()
        })
    });

    group.finish();
}

// ─── Whole pipeline ──────────────────────────────────────────────────

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    group.bench_function("literal_arithmetic", |b| {
        let expr = Expr::Mul(
            Box::new(Expr::Add(
                Box::new(Expr::int(IrType::U32, 2)),
                Box::new(Expr::int(IrType::U32, 3)),
            )),
            Box::new(Expr::int(IrType::U32, 4)),
        );
        b.iter(|| compile(black_box(&expr)).unwrap())
    });

    group.bench_function("float_pipeline", |b| {
        let expr = Expr::Add(
            Box::new(Expr::Float(1.25)),
            Box::new(Expr::Float(2.5)),
        );
        b.iter(|| compile(black_box(&expr)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_lowering, bench_compile);
criterion_main!(benches);
