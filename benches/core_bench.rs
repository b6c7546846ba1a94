//! Benchmarks for landing zone core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use landing_zone_planner::core::directory::StaticDirectory;
use landing_zone_planner::core::hasher::plan_fingerprint;
use landing_zone_planner::core::index::ReferenceIndex;
use landing_zone_planner::core::parser::{load_config, ConfigSources};
use landing_zone_planner::core::resolver::resolve;
use landing_zone_planner::core::schema::SchemaRegistry;

const GLOBAL: &str = r#"
homeRegion: us-east-1
enabledRegions: [us-east-1, us-west-2, eu-west-1]
logging:
  account: Log Archive
  cloudtrail:
    enable: true
    organizationTrail: true
"#;

const ACCOUNTS: &str = r#"
mandatoryAccounts:
  - name: Management
    email: mgmt@example.com
    organizationalUnit: Root
  - name: Log Archive
    email: logs@example.com
    organizationalUnit: Security
"#;

const ORGANIZATION: &str = r#"
organizationalUnits:
  - name: Security
  - name: Infrastructure
"#;

const DIRECTORY: &str = r#"
accounts:
  mgmt@example.com: "000000000000"
  logs@example.com: "999999999999"
organizationalUnits:
  Security:
    arn: arn:aws:organizations::000000000000:ou/o-bench/ou-sec
    accounts: ["999999999999"]
  Infrastructure:
    arn: arn:aws:organizations::000000000000:ou/o-bench/ou-infra
    accounts: ["111111111111", "222222222222", "333333333333", "444444444444"]
"#;

/// A chain of gateways, each depending on the previous, with two route tables apiece.
fn network(gateways: usize) -> String {
    let mut yaml = String::from("transitGateways:\n");
    for i in 0..gateways {
        yaml.push_str(&format!(
            "  - name: tgw-{i}\n    asn: {}\n    deploymentTargets:\n      organizationalUnits: [Infrastructure]\n      regions: [us-east-1, eu-west-1]\n    routeTables:\n      - name: tgw-{i}-core\n      - name: tgw-{i}-segregated\n",
            64512 + i
        ));
        if i > 0 {
            yaml.push_str(&format!("    dependsOn: [tgw-{}]\n", i - 1));
        }
    }
    yaml
}

fn sources(gateways: usize) -> ConfigSources {
    ConfigSources {
        global: GLOBAL.to_string(),
        accounts: ACCOUNTS.to_string(),
        organization: ORGANIZATION.to_string(),
        network: network(gateways),
    }
}

fn bench_load_config(c: &mut Criterion) {
    let registry = SchemaRegistry::v1();
    let mut group = c.benchmark_group("load_config");
    for size in [10, 50, 200] {
        let sources = sources(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &sources, |b, sources| {
            b.iter(|| {
                let config = load_config(black_box(sources), &registry).unwrap();
                black_box(config);
            });
        });
    }
    group.finish();
}

fn bench_index_build(c: &mut Criterion) {
    let registry = SchemaRegistry::v1();
    let directory = StaticDirectory::from_yaml(DIRECTORY).unwrap();
    let mut group = c.benchmark_group("index_build");
    for size in [10, 50, 200] {
        let config = load_config(&sources(size), &registry).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &config, |b, config| {
            b.iter(|| {
                let index = ReferenceIndex::build(black_box(config), &directory).unwrap();
                black_box(index);
            });
        });
    }
    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let registry = SchemaRegistry::v1();
    let directory = StaticDirectory::from_yaml(DIRECTORY).unwrap();
    let mut group = c.benchmark_group("resolve");
    for size in [10, 50, 200] {
        let config = load_config(&sources(size), &registry).unwrap();
        let index = ReferenceIndex::build(&config, &directory).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &config, |b, config| {
            b.iter(|| {
                let plan = resolve(black_box(config), &index).unwrap();
                black_box(plan);
            });
        });
    }
    group.finish();
}

fn bench_fingerprint(c: &mut Criterion) {
    let registry = SchemaRegistry::v1();
    let directory = StaticDirectory::from_yaml(DIRECTORY).unwrap();
    let config = load_config(&sources(200), &registry).unwrap();
    let index = ReferenceIndex::build(&config, &directory).unwrap();
    let plan = resolve(&config, &index).unwrap();
    c.bench_function("plan_fingerprint_200", |b| {
        b.iter(|| black_box(plan_fingerprint(black_box(&plan))));
    });
}

criterion_group!(
    benches,
    bench_load_config,
    bench_index_build,
    bench_resolve,
    bench_fingerprint
);
criterion_main!(benches);
