// Cross-checks between motet_smf and the independent `midly` parser.
//
// Files written here must parse with midly to the same events, files written
// by midly must decode here to the same events, and canonical track bodies
// must survive decode/encode byte for byte.

use midly::{
    Format, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use motet_smf::{
    Event, EventKind, KeySignature, SmfFile, Tempo, TimeSignature, Track, decode_track,
    encode_track,
};
use pretty_assertions::assert_eq;

/// A simple two-voice piece: 4 measures of 4/4 at 96 ticks per quarter.
fn sample_file() -> SmfFile {
    let mut file = SmfFile::new(96);

    let mut melody = Track::new();
    melody.add_meta(0, TimeSignature::new(4, 4));
    melody.add_meta(0, Tempo::from_bpm(100));
    melody.add_meta(
        0,
        KeySignature {
            sharps: 1,
            minor: false,
        },
    );
    melody.change_instrument(0, 0, 73);
    let pitches = [67, 69, 71, 72, 74, 72, 71, 69];
    for (i, &p) in pitches.iter().cycle().take(16).enumerate() {
        melody.add_note(i as u64 * 96, 96, 0, p, 90);
    }

    let mut bass = Track::new();
    bass.change_instrument(0, 1, 32);
    for m in 0..4u64 {
        bass.add_note(m * 384, 192, 1, 43, 70);
        bass.add_note(m * 384 + 192, 192, 1, 50, 70);
    }

    file.tracks.push(melody);
    file.tracks.push(bass);
    file
}

/// Flatten a midly track into `(absolute time, status, data...)` tuples.
fn midly_events(track: &[TrackEvent<'_>]) -> Vec<(u64, Vec<u8>)> {
    let mut time = 0u64;
    let mut out = Vec::new();
    for ev in track {
        time += u64::from(ev.delta.as_int());
        let bytes = match ev.kind {
            TrackEventKind::Midi { channel, message } => {
                let ch = channel.as_int();
                match message {
                    MidiMessage::NoteOn { key, vel } => vec![0x90 | ch, key.as_int(), vel.as_int()],
                    MidiMessage::NoteOff { key, vel } => {
                        vec![0x80 | ch, key.as_int(), vel.as_int()]
                    }
                    MidiMessage::ProgramChange { program } => vec![0xC0 | ch, program.as_int()],
                    _ => continue,
                }
            }
            TrackEventKind::Meta(MetaMessage::EndOfTrack) => continue,
            TrackEventKind::Meta(MetaMessage::Tempo(t)) => {
                let b = t.as_int().to_be_bytes();
                vec![0xFF, 0x51, b[1], b[2], b[3]]
            }
            TrackEventKind::Meta(MetaMessage::TimeSignature(n, d, c, b)) => {
                vec![0xFF, 0x58, n, d, c, b]
            }
            TrackEventKind::Meta(MetaMessage::KeySignature(sf, minor)) => {
                vec![0xFF, 0x59, sf as u8, u8::from(minor)]
            }
            _ => continue,
        };
        out.push((time, bytes));
    }
    out
}

/// The same flattening for our own events.
fn own_events(track: &Track) -> Vec<(u64, Vec<u8>)> {
    track
        .sorted_events()
        .into_iter()
        .map(|e| {
            let bytes = match &e.kind {
                EventKind::NoteOn { key, velocity, .. } | EventKind::NoteOff { key, velocity, .. } => {
                    vec![e.status_byte(), *key, *velocity]
                }
                EventKind::ProgramChange { program, .. } => vec![e.status_byte(), *program],
                EventKind::Meta(m) => {
                    let mut v = vec![0xFF, m.meta_type];
                    v.extend_from_slice(&m.data);
                    v
                }
                other => panic!("unexpected event in fixture: {other:?}"),
            };
            (e.time, bytes)
        })
        .collect()
}

#[test]
fn midly_reads_what_we_write() {
    let file = sample_file();
    let bytes = file.to_bytes().unwrap();
    let smf = Smf::parse(&bytes).unwrap();

    assert_eq!(smf.header.format, Format::Parallel);
    assert_eq!(smf.header.timing, Timing::Metrical(u15::new(96)));
    assert_eq!(smf.tracks.len(), 2);
    for (ours, theirs) in file.tracks.iter().zip(&smf.tracks) {
        assert_eq!(midly_events(theirs), own_events(ours));
        assert!(matches!(
            theirs.last().map(|e| e.kind),
            Some(TrackEventKind::Meta(MetaMessage::EndOfTrack))
        ));
    }
}

#[test]
fn we_read_what_midly_writes() {
    let mut smf = Smf::new(midly::Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(96)),
    ));
    let mut track = vec![TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000))),
    }];
    for (i, key) in [60u8, 62, 64, 65].into_iter().enumerate() {
        track.push(TrackEvent {
            delta: u28::new(if i == 0 { 0 } else { 48 }),
            kind: TrackEventKind::Midi {
                channel: u4::new(2),
                message: MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(80),
                },
            },
        });
        track.push(TrackEvent {
            delta: u28::new(48),
            kind: TrackEventKind::Midi {
                channel: u4::new(2),
                message: MidiMessage::NoteOff {
                    key: u7::new(key),
                    vel: u7::new(0),
                },
            },
        });
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    let mut bytes = Vec::new();
    smf.write(&mut bytes).unwrap();

    let file = SmfFile::parse(&bytes).unwrap();
    assert_eq!(file.resolution, 96);
    assert_eq!(file.tracks.len(), 1);
    assert_eq!(midly_events(&smf.tracks[0]), own_events(&file.tracks[0]));
    assert_eq!(file.tempo(), Some(Tempo::from_bpm(120)));
    assert_eq!(file.tracks[0].end_time(), 336);
}

#[test]
fn canonical_bodies_are_byte_identical() {
    for track in sample_file().tracks {
        let body = encode_track(&track).unwrap();
        let decoded = decode_track(&body).unwrap();
        assert_eq!(encode_track(&decoded).unwrap(), body);
    }
}

#[test]
fn running_status_across_meta_is_semantically_preserved() {
    // Hand-written body that relies on running status straddling a meta
    // event. Re-encoding inserts the status byte again but the events and
    // their absolute times are unchanged.
    let body = [
        0x00, 0x90, 60, 100, //
        0x10, 0xFF, 0x01, 0x02, b'h', b'i', //
        0x10, 60, 0, //
        0x00, 0xFF, 0x2F, 0x00,
    ];
    let decoded = decode_track(&body).unwrap();
    let reencoded = encode_track(&decoded).unwrap();
    assert_ne!(reencoded, body);
    assert_eq!(reencoded.len(), body.len() + 1);
    let again = decode_track(&reencoded).unwrap();
    assert_eq!(again.events, decoded.events);
    assert_eq!(
        again.events.last(),
        Some(&Event::note_on(32, 0, 60, 0))
    );
}

#[test]
fn whole_file_roundtrip_preserves_events() {
    let file = sample_file();
    let back = SmfFile::parse(&file.to_bytes().unwrap()).unwrap();
    for (a, b) in file.tracks.iter().zip(&back.tracks) {
        assert_eq!(own_events(a), own_events(b));
    }
    assert_eq!(back.to_bytes().unwrap(), file.to_bytes().unwrap());
}
