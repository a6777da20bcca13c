use criterion::{Criterion, black_box, criterion_group, criterion_main};
use seqlearn_core::{Corpus, Dictionary, IwaReader};

fn synthetic_data(instances: usize) -> String {
    let mut data = String::new();
    for i in 0..instances {
        for t in 0..12 {
            let label = if t % 3 == 0 { "B-NP" } else { "I-NP" };
            data.push_str(&format!(
                "{}\tw[0]=tok{}\tw[-1]=tok{}\tsuffix={}:0.5\n",
                label,
                (i * 7 + t) % 500,
                (i * 7 + t + 499) % 500,
                t % 10
            ));
        }
        data.push('\n');
    }
    data
}

fn bench_dictionary(c: &mut Criterion) {
    let tokens: Vec<String> = (0..10_000).map(|i| format!("w[0]=tok{}", i % 2_500)).collect();

    c.bench_function("dictionary_get_or_insert_10k", |b| {
        b.iter(|| {
            let mut dict = Dictionary::new();
            for token in &tokens {
                black_box(dict.get_or_insert(token).unwrap());
            }
        });
    });
}

fn bench_ingest(c: &mut Criterion) {
    let data = synthetic_data(500);

    c.bench_function("ingest_500_instances", |b| {
        b.iter(|| {
            let mut corpus = Corpus::new();
            let mut attrs = Dictionary::new();
            let mut labels = Dictionary::new();
            corpus
                .ingest(
                    IwaReader::new(black_box(data.as_bytes()), "bench"),
                    &mut attrs,
                    &mut labels,
                    0,
                )
                .unwrap();
        });
    });
}

criterion_group!(benches, bench_dictionary, bench_ingest);
criterion_main!(benches);
