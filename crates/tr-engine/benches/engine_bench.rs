use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tr_engine::{MixerSettings, Scheduler};
use tr_ir::song::OrderEntry;
use tr_ir::{Note, Pattern, Sample, SampleData, Song};

fn four_channel_song(pattern_rows: u16, orders: usize) -> Song {
    let mut song = Song::with_channels("bench", 4);
    let mut inst = tr_ir::Instrument::new("saw");
    inst.sample.data = SampleData::Mono8((0..4096).map(|i| (i % 128) as i8 - 64).collect());
    inst.sample.c2spd = 8363;
    inst.sample.default_volume = 48;
    song.instruments.push(inst);

    let mut pattern = Pattern::new(pattern_rows, 4);
    for row in 0..pattern_rows {
        for ch in 0..4u8 {
            if (row + ch as u16) % 4 == 0 {
                let cell = pattern.cell_mut(row, ch);
                cell.note = Note::On(36 + (row % 24) as u8);
                cell.instrument = 1;
            }
        }
    }
    song.patterns.push(pattern);
    for _ in 0..orders {
        song.order_list.push(OrderEntry::Pattern(0));
    }
    song
}

fn render_full_song(c: &mut Criterion) {
    let song = four_channel_song(64, 8);
    c.bench_function("scheduler_render_64row_8order", |b| {
        b.iter(|| {
            let sched = Scheduler::new(&song, 44100, MixerSettings::default(), 0, 0).unwrap();
            let frames: usize = sched.map(|f| black_box(f.samples.len())).sum();
            black_box(frames)
        })
    });
}

criterion_group!(benches, render_full_song);
criterion_main!(benches);
