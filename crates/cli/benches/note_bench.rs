use criterion::{black_box, criterion_group, criterion_main, Criterion};
use note::{calculate_id, compute_id, note_from_json, note_to_json, Note, NoteBuilder};

const HEX_PK: &str = "b169f596968917a1abeb4234d3cf3aa9baee2112e58998d17c6db416ad33fe40";

fn build(buf: &mut [u8]) -> usize {
    let mut b = NoteBuilder::new(buf).unwrap();
    b.set_kind(1);
    b.set_created_at(1_689_836_342);
    b.set_content("the quick brown fox jumps over the lazy dog").unwrap();
    for i in 0..10 {
        b.new_tag().unwrap();
        b.push_tag_str(if i % 2 == 0 { "p" } else { "e" }).unwrap();
        b.push_tag_str(HEX_PK).unwrap();
        b.push_tag_str("wss://relay.example.com").unwrap();
    }
    b.finalize().unwrap().1
}

fn note_build(c: &mut Criterion) {
    let mut buf = vec![0u8; 16 * 1024];
    c.bench_function("note_build_10_tags", |b| {
        b.iter(|| black_box(build(&mut buf)));
    });
}

fn note_iterate_tags(c: &mut Criterion) {
    let mut buf = vec![0u8; 16 * 1024];
    let size = build(&mut buf);
    let note = Note::from_bytes(&buf[..size]).unwrap();
    c.bench_function("note_iterate_tags", |b| {
        b.iter(|| {
            let mut elems = 0;
            for tag in note.tags() {
                for s in tag {
                    black_box(s);
                    elems += 1;
                }
            }
            assert_eq!(elems, 30);
        });
    });
}

fn note_id(c: &mut Criterion) {
    let mut buf = vec![0u8; 16 * 1024];
    let size = build(&mut buf);
    let note = Note::from_bytes(&buf[..size]).unwrap();
    c.bench_function("note_compute_id", |b| {
        b.iter(|| black_box(compute_id(&note).unwrap()));
    });
}

fn note_json(c: &mut Criterion) {
    let mut buf = vec![0u8; 16 * 1024];
    let size = build(&mut buf);
    calculate_id(&mut buf[..size]).unwrap();
    let json = note_to_json(&Note::from_bytes(&buf[..size]).unwrap()).unwrap();

    let mut out = vec![0u8; 16 * 1024];
    c.bench_function("note_from_json", |b| {
        b.iter(|| black_box(note_from_json(&json, &mut out).unwrap().1));
    });
}

criterion_group!(benches, note_build, note_iterate_tags, note_id, note_json);
criterion_main!(benches);
