use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use order_matcher::custody::InMemoryCustody;
use order_matcher::engine::{Engine, MatchPolicy};
use order_matcher::orders::Side;

/// Engine pre-loaded with `depth` one-unit resting sells at prices
/// 100..150, all backed by one funded seller.
fn setup_engine(policy: MatchPolicy, depth: u64) -> Engine<InMemoryCustody> {
    let mut engine = Engine::new(InMemoryCustody::new(), "admin".into()).with_policy(policy);
    engine.whitelist_asset("admin", "BTC").unwrap();
    engine.set_trading_enabled("admin", true).unwrap();
    engine.custody_mut().deposit("seller", "BTC", depth);
    engine.custody_mut().approve("seller", "BTC", depth);
    for i in 0..depth {
        engine
            .create_order("seller", "BTC", 1, 100 + (i % 50), Side::Sell)
            .unwrap();
    }
    engine
}

fn bench_matching(c: &mut Criterion) {
    let depth = 1_000;
    let cases = [
        ("id ascending scan", MatchPolicy::IdAscending),
        ("best price first", MatchPolicy::BestPriceFirst),
    ];
    for (name, policy) in cases {
        let engine = setup_engine(policy, depth);
        c.bench_function(&format!("sweep 500 resting sells, {name}"), |b| {
            b.iter_batched(
                || engine.clone(),
                |mut engine| {
                    engine
                        .create_order("buyer", "BTC", depth / 2, 200, Side::Buy)
                        .unwrap()
                },
                BatchSize::SmallInput,
            )
        });
    }
}

criterion_group!(benches, bench_matching);
criterion_main!(benches);
