//! Benchmarks for whole-file expansion.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use prep_core::{Preprocessor, PreprocessorConfig};

/// Generate an input with the given number of sections, each gated by a
/// conditional and carrying substituted lines.
fn generate_input(sections: usize, lines_per_section: usize) -> String {
    let mut src = String::with_capacity(sections * lines_per_section * 40);
    src.push_str("#define BASE 10\n");

    for i in 0..sections {
        src.push_str(&format!("#define SECTION {i}\n"));
        src.push_str("#if SECTION % 2 == 0\n");
        for j in 0..lines_per_section {
            src.push_str(&format!("section SECTION line {j} of $(BASE)\n"));
        }
        src.push_str("#else\nskipped\n#endif\n");
    }
    src
}

fn expand_all(input: &str) -> String {
    let mut pp = Preprocessor::new(PreprocessorConfig::default());
    pp.files_mut()
        .register_memory("bench", input)
        .expect("fresh registry");
    pp.expand("bench")
        .expect("valid input")
        .collect_string()
        .expect("expansion succeeds")
}

fn bench_plain_text(c: &mut Criterion) {
    let input = "just a line of text with no directives at all\n".repeat(500);

    let mut group = c.benchmark_group("plain_text");
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.bench_function("expand", |b| b.iter(|| expand_all(&input)));
    group.finish();
}

fn bench_conditionals(c: &mut Criterion) {
    let mut group = c.benchmark_group("conditionals");

    for sections in [10, 50, 200] {
        let input = generate_input(sections, 5);
        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(sections),
            &input,
            |b, input| b.iter(|| expand_all(input)),
        );
    }

    group.finish();
}

fn bench_loop_unrolling(c: &mut Criterion) {
    let input = "#for x in range(100):\nitem $(x)\n#endfor\n";

    c.bench_function("loop_unroll_100", |b| b.iter(|| expand_all(input)));
}

fn bench_substitution_heavy(c: &mut Criterion) {
    let mut src = String::new();
    src.push_str("#define A 1\n#define B (A + A)\n#define C (B + B)\n#define D (C + C)\n");
    for _ in 0..200 {
        src.push_str("x=$(D) raw D and C here\n");
    }

    c.bench_function("substitution_heavy", |b| b.iter(|| expand_all(&src)));
}

fn bench_includes(c: &mut Criterion) {
    let mut pp = Preprocessor::new(PreprocessorConfig::default());
    pp.files_mut()
        .register_memory("lib", "#define SHARED 1\ncommon line\n")
        .expect("fresh registry");
    let main = "#include \"lib\"\n".repeat(50);
    pp.files_mut()
        .register_memory("main", main)
        .expect("fresh registry");

    c.bench_function("include_50", |b| {
        b.iter(|| {
            pp.expand("main")
                .expect("valid input")
                .collect_string()
                .expect("expansion succeeds")
        });
    });
}

criterion_group!(
    benches,
    bench_plain_text,
    bench_conditionals,
    bench_loop_unrolling,
    bench_substitution_heavy,
    bench_includes,
);

criterion_main!(benches);
