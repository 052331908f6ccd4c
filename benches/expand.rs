use std::collections::HashMap;
use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use flowline::workflow::{Job, Matrix, Step, Workflow};

const CI_YAML: &str = r#"
name: ci
on:
  pull_request:
    branches: [main]
  dispatch:
jobs:
  lint:
    runs-on: ubuntu-22.04
    steps:
      - uses: actions/checkout@v4
      - run: tox -e lint
  test:
    runs-on: ${{ matrix.os }}
    needs: lint
    strategy:
      matrix:
        os: [ubuntu-22.04, ubuntu-20.04, macos-13]
        interpreter: ["3.9", "3.10", "3.11"]
    steps:
      - uses: actions/checkout@v4
      - uses: actions/setup-python@v5
        with:
          python-version: ${{ matrix.interpreter }}
      - run: pip install tox
      - run: tox -e py
  docs:
    runs-on: ubuntu-22.04
    needs: test
    steps:
      - uses: actions/checkout@v4
      - run: tox -e docs
"#;

fn grid_matrix(axes: usize, values_per_axis: usize) -> Matrix {
    let mut matrix = Matrix::new();
    for axis in 0..axes {
        let values = (0..values_per_axis).map(|v| format!("v{v}")).collect();
        matrix = matrix.add_axis(format!("axis{axis}"), values);
    }
    matrix
}

fn bench_matrix_expand(c: &mut Criterion) {
    let mut group = c.benchmark_group("matrix_expand");

    for axes in [1usize, 2, 3, 4] {
        let matrix = grid_matrix(axes, 4);
        group.bench_with_input(BenchmarkId::from_parameter(axes), &matrix, |b, matrix| {
            b.iter(|| black_box(matrix.expand()));
        });
    }

    group.finish();
}

fn bench_matrix_expand_with_excludes(c: &mut Criterion) {
    let mut matrix = grid_matrix(3, 4);
    for v in 0..4 {
        let mut rule = HashMap::new();
        rule.insert("axis0".to_string(), format!("v{v}"));
        rule.insert("axis1".to_string(), format!("v{v}"));
        matrix = matrix.add_exclude(rule);
    }

    c.bench_function("matrix_expand_excludes", |b| {
        b.iter(|| black_box(matrix.expand()));
    });
}

fn bench_workflow_parse(c: &mut Criterion) {
    c.bench_function("workflow_parse", |b| {
        b.iter(|| black_box(Workflow::from_yaml_str(CI_YAML).unwrap()));
    });
}

fn bench_expand_jobs(c: &mut Criterion) {
    let workflow = Workflow::from_yaml_str(CI_YAML).unwrap();

    c.bench_function("expand_jobs", |b| {
        b.iter(|| black_box(workflow.expand_jobs().unwrap()));
    });
}

fn bench_execution_order(c: &mut Criterion) {
    // a linear chain is the worst case for the ready-set scan
    let mut builder = Workflow::builder("chain").on_dispatch();
    for i in 0..50 {
        let mut job = Job::new("ubuntu-22.04").with_step(Step::run_command("true"));
        if i > 0 {
            job = job.with_need(format!("job{}", i - 1));
        }
        builder = builder.job(format!("job{i}"), job);
    }
    let workflow = builder.build_unchecked();

    c.bench_function("execution_order_chain", |b| {
        b.iter(|| black_box(workflow.execution_order().unwrap()));
    });
}

criterion_group!(
    benches,
    bench_matrix_expand,
    bench_matrix_expand_with_excludes,
    bench_workflow_parse,
    bench_expand_jobs,
    bench_execution_order,
);

criterion_main!(benches);
