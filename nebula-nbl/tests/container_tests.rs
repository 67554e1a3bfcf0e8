//! End-to-end container tests: write animations, read them back, and check
//! playback semantics (lifecycle, seeking, quantization error bounds).

use glam::Vec3;
use nebula_nbl::{
    transcode, transforms, CancelToken, LiveSet, NblReader, NblWriter, ParticleId, ParticleState,
    TextureDesc, TranscodeOptions, WriterOptions,
};
use std::io::Cursor;

fn flame() -> TextureDesc {
    TextureDesc::new("minecraft:textures/particle/flame.png", 1, 1)
}

fn particle(pos: Vec3, col: [u8; 4], size: u16) -> ParticleState {
    ParticleState {
        pos,
        col,
        size,
        tex_id: 0,
        seq_idx: 0,
    }
}

fn live(entries: &[(ParticleId, ParticleState)]) -> LiveSet {
    let mut set = LiveSet::new();
    for &(id, state) in entries {
        set.insert(id, state);
    }
    set
}

/// Collects a live set into id-sorted rows for comparisons.
fn snapshot(set: &LiveSet) -> Vec<(ParticleId, ParticleState)> {
    let mut rows: Vec<_> = set.iter().collect();
    rows.sort_by_key(|(id, _)| *id);
    rows
}

#[test]
fn single_frame_one_particle() {
    let state = particle(Vec3::new(1.0, 2.0, 3.0), [255, 128, 64, 255], 100);
    let mut writer = NblWriter::create(Vec::new(), 30, vec![flame()]).unwrap();
    writer.push_frame(&live(&[(42, state)]), false).unwrap();
    let bytes = writer.finish().unwrap();

    let mut reader = NblReader::open(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.header().target_fps, 30);
    assert_eq!(reader.total_frames(), 1);
    assert_eq!(reader.textures(), &[flame()]);

    let set = reader.seek(0).unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(set.get(42).unwrap(), state);
}

#[test]
fn two_frame_update() {
    let frame0 = live(&[(42, particle(Vec3::new(1.0, 2.0, 3.0), [255, 128, 64, 255], 100))]);
    let frame1 = live(&[(42, particle(Vec3::new(2.5, 2.0, 3.0), [245, 128, 64, 255], 100))]);

    let mut writer = NblWriter::create(Vec::new(), 30, vec![flame()]).unwrap();
    writer.push_frame(&frame0, false).unwrap();
    writer.push_frame(&frame1, false).unwrap();
    let bytes = writer.finish().unwrap();

    let mut reader = NblReader::open(Cursor::new(bytes)).unwrap();
    // The motion fits a P-frame, so frame 1 is not a keyframe.
    assert_eq!(reader.keyframes(), &[0]);
    let s = reader.seek(1).unwrap().get(42).unwrap();
    assert_eq!(s.pos, Vec3::new(2.5, 2.0, 3.0));
    assert_eq!(s.col, [245, 128, 64, 255]);
}

#[test]
fn spawn_via_pframe_zero_basis() {
    let frame1 = live(&[(
        7,
        particle(Vec3::new(0.5, 1.0, -0.25), [200, 200, 200, 255], 50),
    )]);

    let mut writer = NblWriter::create(Vec::new(), 30, Vec::new()).unwrap();
    writer.push_frame(&LiveSet::new(), false).unwrap(); // empty I-frame
    writer.push_frame(&frame1, false).unwrap();
    let bytes = writer.finish().unwrap();

    let mut reader = NblReader::open(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.keyframes(), &[0], "spawn must not force a keyframe");

    assert!(reader.seek(0).unwrap().is_empty());
    let set = reader.seek(1).unwrap();
    let s = set.get(7).unwrap();
    assert_eq!(s.pos, Vec3::new(0.5, 1.0, -0.25));
    assert_eq!(s.col, [200, 200, 200, 255]);
    assert_eq!(s.size, 50);
}

#[test]
fn despawn_removes_missing_ids() {
    let a = particle(Vec3::new(1.0, 0.0, 0.0), [255; 4], 100);
    let b = particle(Vec3::new(2.0, 0.0, 0.0), [255; 4], 100);
    let c = particle(Vec3::new(3.0, 0.0, 0.0), [255; 4], 100);

    let mut writer = NblWriter::create(Vec::new(), 30, Vec::new()).unwrap();
    writer.push_frame(&live(&[(1, a), (2, b), (3, c)]), false).unwrap();
    writer.push_frame(&live(&[(1, a), (3, c)]), false).unwrap();
    let bytes = writer.finish().unwrap();

    let mut reader = NblReader::open(Cursor::new(bytes)).unwrap();
    let set = reader.seek(1).unwrap();
    let mut ids: Vec<_> = set.ids().to_vec();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 3]);
    assert!(set.get(2).is_none());
}

#[test]
fn respawn_resets_to_zero_basis() {
    let first_life = particle(Vec3::new(5.0, 5.0, 5.0), [10, 10, 10, 10], 1000);
    let second_life = particle(Vec3::new(0.25, 0.0, 0.0), [90, 90, 90, 255], 500);

    let mut writer = NblWriter::create(Vec::new(), 30, Vec::new()).unwrap();
    writer.push_frame(&live(&[(9, first_life)]), false).unwrap();
    writer.push_frame(&LiveSet::new(), false).unwrap();
    writer.push_frame(&live(&[(9, second_life)]), false).unwrap();
    let bytes = writer.finish().unwrap();

    let mut reader = NblReader::open(Cursor::new(bytes)).unwrap();
    assert!(reader.seek(1).unwrap().is_empty());
    // The second spawn carries no memory of the first life.
    assert_eq!(reader.seek(2).unwrap().get(9).unwrap(), second_life);
}

#[test]
fn teleport_forces_keyframe() {
    let mut writer = NblWriter::create(Vec::new(), 30, Vec::new()).unwrap();
    writer
        .push_frame(&live(&[(1, particle(Vec3::ZERO, [255; 4], 100))]), false)
        .unwrap();
    writer
        .push_frame(
            &live(&[(1, particle(Vec3::new(40.0, 0.0, 0.0), [255; 4], 100))]),
            false,
        )
        .unwrap();
    let bytes = writer.finish().unwrap();

    let mut reader = NblReader::open(Cursor::new(bytes)).unwrap();
    assert!(reader.is_keyframe(1));
    assert_eq!(reader.keyframes(), &[0, 1]);
    assert_eq!(reader.seek(1).unwrap().get(1).unwrap().pos.x, 40.0);
}

/// 180-frame animation with keyframes at 0, 60, 120 and per-frame drift.
fn long_animation() -> Vec<u8> {
    let options = WriterOptions {
        max_gop: u32::MAX,
        ..Default::default()
    };
    let mut writer = NblWriter::create_with(Vec::new(), 60, Vec::new(), options).unwrap();
    for f in 0..180u32 {
        let mut set = LiveSet::new();
        // Two particles on exact binary steps so re-quantization is exact.
        set.insert(
            1,
            particle(Vec3::new(f as f32 * 0.5, 0.0, 0.0), [255; 4], 100),
        );
        set.insert(
            2,
            particle(Vec3::new(-(f as f32) * 0.25, 1.0, 0.0), [128; 4], 200),
        );
        writer.push_frame(&set, f == 60 || f == 120).unwrap();
    }
    writer.finish().unwrap()
}

#[test]
fn random_seek_matches_stepping() {
    let bytes = long_animation();
    let mut a = NblReader::open(Cursor::new(bytes.clone())).unwrap();
    assert_eq!(a.keyframes(), &[0, 60, 120]);

    let mut b = NblReader::open(Cursor::new(bytes)).unwrap();
    b.seek(120).unwrap();
    for _ in 0..30 {
        b.step_forward().unwrap();
    }
    assert_eq!(snapshot(a.seek(150).unwrap()), snapshot(b.live()));
}

#[test]
fn seek_equals_step_from_zero() {
    let bytes = long_animation();
    let mut stepper = NblReader::open(Cursor::new(bytes.clone())).unwrap();
    stepper.seek(0).unwrap();

    for f in [13u32, 59, 60, 61, 119, 140, 179] {
        let mut seeker = NblReader::open(Cursor::new(bytes.clone())).unwrap();
        while stepper.current_frame() != Some(f) {
            stepper.step_forward().unwrap();
        }
        assert_eq!(
            snapshot(seeker.seek(f).unwrap()),
            snapshot(stepper.live()),
            "frame {f}"
        );
    }
}

#[test]
fn quantization_error_stays_bounded_within_gop() {
    // Motion on a step no f32/1000 grid represents exactly.
    let step = 0.3337f32;
    let frames = 40u32;
    let mut writer = NblWriter::create(Vec::new(), 30, Vec::new()).unwrap();
    for f in 0..frames {
        let mut set = LiveSet::new();
        set.insert(
            1,
            particle(Vec3::new(f as f32 * step, 0.0, 0.0), [77; 4], 321),
        );
        writer.push_frame(&set, false).unwrap();
    }
    let bytes = writer.finish().unwrap();

    let mut reader = NblReader::open(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.keyframes(), &[0], "all motion fits P-frames");
    reader.seek(0).unwrap();
    for f in 0..frames {
        if f > 0 {
            reader.step_forward().unwrap();
        }
        let s = reader.live().get(1).unwrap();
        let expected = f as f32 * step;
        let budget = 0.0006 * (f as f32 + 1.0);
        assert!(
            (s.pos.x - expected).abs() <= budget,
            "frame {f}: {} vs {expected} (budget {budget})",
            s.pos.x
        );
        // Color and size are carried exactly.
        assert_eq!(s.col, [77; 4]);
        assert_eq!(s.size, 321);
    }
}

#[test]
fn identity_transcode_is_bit_exact() {
    // Exact binary motion, no despawns, same keyframe positions: the
    // re-encoded container reproduces the source byte for byte.
    let src = {
        let mut writer = NblWriter::create(Vec::new(), 30, vec![flame()]).unwrap();
        for f in 0..10u32 {
            let mut set = LiveSet::new();
            set.insert(
                1,
                particle(Vec3::new(f as f32 * 0.5, 0.0, 0.0), [200, 100, 50, 255], 100),
            );
            writer.push_frame(&set, f == 5).unwrap();
        }
        writer.finish().unwrap()
    };

    let mut reader = NblReader::open(Cursor::new(src.clone())).unwrap();
    let writer = NblWriter::create(Vec::new(), 30, vec![flame()]).unwrap();
    let out = transcode(
        &mut reader,
        writer,
        transforms::identity(),
        &TranscodeOptions::default(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(out, src);
}

#[test]
fn empty_chunk_and_empty_animation() {
    // A frame with zero particles is a valid chunk.
    let mut writer = NblWriter::create(Vec::new(), 30, Vec::new()).unwrap();
    writer.push_frame(&LiveSet::new(), false).unwrap();
    let bytes = writer.finish().unwrap();
    let mut reader = NblReader::open(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.total_frames(), 1);
    assert!(reader.seek(0).unwrap().is_empty());

    // And an animation with no frames at all is a valid container.
    let bytes = NblWriter::create(Vec::new(), 30, Vec::new())
        .unwrap()
        .finish()
        .unwrap();
    let reader = NblReader::open(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.total_frames(), 0);
}

#[test]
fn roundtrip_through_a_real_file() {
    let state = particle(Vec3::new(1.0, 2.0, 3.0), [255, 128, 64, 255], 100);
    let file = tempfile::NamedTempFile::new().unwrap();

    let mut writer = NblWriter::create(file.reopen().unwrap(), 30, vec![flame()]).unwrap();
    writer.push_frame(&live(&[(42, state)]), false).unwrap();
    writer
        .push_frame(
            &live(&[(42, particle(Vec3::new(1.5, 2.0, 3.0), [255, 128, 64, 255], 100))]),
            false,
        )
        .unwrap();
    writer.finish().unwrap();

    let mut reader = NblReader::open(file.reopen().unwrap()).unwrap();
    assert_eq!(reader.total_frames(), 2);
    assert_eq!(reader.seek(1).unwrap().get(42).unwrap().pos.x, 1.5);
}

#[test]
fn bbox_covers_all_frames() {
    let mut writer = NblWriter::create(Vec::new(), 30, Vec::new()).unwrap();
    writer
        .push_frame(
            &live(&[(1, particle(Vec3::new(-4.0, 2.0, 0.0), [255; 4], 100))]),
            false,
        )
        .unwrap();
    writer
        .push_frame(
            &live(&[(1, particle(Vec3::new(3.0, -1.0, 8.0), [255; 4], 100))]),
            false,
        )
        .unwrap();
    let bytes = writer.finish().unwrap();

    let reader = NblReader::open(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.header().bbox_min, Vec3::new(-4.0, -1.0, 0.0));
    assert_eq!(reader.header().bbox_max, Vec3::new(3.0, 2.0, 8.0));
}
