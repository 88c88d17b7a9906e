use criterion::{criterion_group, criterion_main, Criterion};

use less::{compile_with_session, Options, Session};

/// A synthetic stylesheet exercising variables, nesting, mixins, math and
/// extends.
fn fixture(rules: usize) -> String {
    let mut source = String::from(
        "@base: 4px;\n\
         @accent: #336699;\n\
         .bordered(@w: 1px) { border: @w solid darken(@accent, 10%); }\n\
         .card { padding: @base * 2; }\n",
    );

    for i in 0..rules {
        source.push_str(&format!(
            ".item-{i} {{\n\
               width: (@base * {i});\n\
               .bordered();\n\
               &:hover {{ color: lighten(@accent, 10%); }}\n\
             }}\n\
             .copy-{i}:extend(.card) {{ margin: {i}px; }}\n"
        ));
    }

    source
}

fn bench_compile(c: &mut Criterion) {
    let session = Session::new_for_test_suite();
    let options = Options::default();

    let small = fixture(10);
    let large = fixture(200);

    c.bench_function("compile 10 rules", |b| {
        b.iter(|| compile_with_session(&small, &options, &session).unwrap())
    });

    c.bench_function("compile 200 rules", |b| {
        b.iter(|| compile_with_session(&large, &options, &session).unwrap())
    });
}

criterion_group!(benches, bench_compile);
criterion_main!(benches);
