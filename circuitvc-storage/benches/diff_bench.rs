// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use circuitvc_core::circuit::{parse_payload, Operand, Operation};
use circuitvc_storage::circuit_git::{DiffConfig, DiffEngine, Repository, VersionControl};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::tempdir;

/// A layered circuit of `n` gates over 8 qubits
fn layered_circuit(n: usize, variant: usize) -> Vec<Operation> {
    (0..n)
        .map(|i| {
            let name = if (i + variant) % 7 == 0 { "rz" } else { ["h", "x", "cx"][i % 3] };
            Operation::gate(name, vec![Operand::new("q", Some((i % 8) as u32))])
        })
        .collect()
}

fn circuit_source(n: usize) -> String {
    (0..n)
        .map(|i| format!("cx q[{}],q[{}];\n", i % 8, (i + 1) % 8))
        .collect()
}

fn bench_structural_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("structural_diff");

    for size in [100, 1000, 5000].iter() {
        let old = layered_circuit(*size, 0);
        let new = layered_circuit(*size, 3);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("table", size), size, |b, _| {
            let engine = DiffEngine::new();
            b.iter(|| engine.diff_operations(black_box(&old), black_box(&new)));
        });

        group.bench_with_input(BenchmarkId::new("hirschberg", size), size, |b, _| {
            let engine = DiffEngine::with_config(DiffConfig {
                max_table_cells: 0,
                ..DiffConfig::default()
            });
            b.iter(|| engine.diff_operations(black_box(&old), black_box(&new)));
        });
    }

    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let source = circuit_source(10_000);

    c.bench_function("parse_10k_statements", |b| {
        b.iter(|| parse_payload(black_box(source.as_bytes())));
    });
}

fn bench_commit(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let vc = VersionControl::new(Repository::init(dir.path(), "bench", false).unwrap());
    let source = circuit_source(200);
    let mut i = 0u64;

    c.bench_function("commit", |b| {
        b.iter(|| {
            i += 1;
            let payload = format!("{}rz({}) q[0];\n", source, i);
            vc.commit("bench", black_box(payload.as_bytes()), "bench", None)
                .unwrap();
        });
    });
}

criterion_group!(benches, bench_structural_diff, bench_parse, bench_commit);

criterion_main!(benches);
