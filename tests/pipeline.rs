//! End-to-end tests for the retiming pipeline.
//!
//! Builds synthetic keyframe, tick-stamped and trailer-stamped frames
//! and runs them through the processor, plus capture-file round trips
//! through the full driver loop.

use std::sync::atomic::AtomicBool;

use retime::driver::{self, RunOptions};
use retime::fcs;
use retime::pcap::{PcapFileReader, PcapFileWriter};
use retime::process::{ComputedTime, ProcessOptions, Processor, Status, TimestampFormat};
use retime::sink::{Sink, WriteOptions};
use retime::source::{RawRecord, ReadOptions, ReadStatus, Source};
use retime::time::PsTime;

use tempfile::NamedTempFile;

/// Keyframe UTC nanoseconds used across the scenarios.
const KF_UTC_NANOS: u64 = 0x64FD_D200;
/// Keyframe tick counter.
const KF_COUNTER: u64 = 0x0ABC_DEF0;
/// Clock time at which the keyframe is observed.
fn kf_clock() -> PsTime {
    PsTime::new(1_700_000_000, 0, 9)
}

fn eth_header(ether_type: u16) -> Vec<u8> {
    let mut header = Vec::new();
    header.extend_from_slice(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff]); // dst
    header.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]); // src
    header.extend_from_slice(&ether_type.to_be_bytes());
    header
}

/// Native keyframe frame: EtherType 0x88B5 + 40-byte payload.
fn build_keyframe() -> Vec<u8> {
    let mut frame = eth_header(0x88B5);
    frame.extend_from_slice(b"EXKF");
    frame.push(1); // version
    frame.extend_from_slice(&[0; 3]);
    frame.extend_from_slice(&KF_UTC_NANOS.to_be_bytes());
    frame.extend_from_slice(&KF_COUNTER.to_be_bytes());
    frame.extend_from_slice(&350_000_000u64.to_be_bytes());
    frame.extend_from_slice(&0u64.to_be_bytes()); // last sync
    frame
}

/// 64-byte data frame whose last four bytes are a tick counter.
fn build_tick_frame(tick: u32) -> Vec<u8> {
    let mut frame = eth_header(0x0806);
    frame.resize(60, 0);
    frame.extend_from_slice(&tick.to_be_bytes());
    frame
}

/// 64-byte data frame ending in a timestamp trailer.
fn build_trailer_frame() -> Vec<u8> {
    let mut frame = eth_header(0x0806);
    frame.resize(48, 0xAA);
    frame.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]); // original fcs
    frame.push(1); // device
    frame.push(2); // port
    frame.extend_from_slice(&(KF_UTC_NANOS as u32).to_be_bytes()); // seconds
    frame.extend_from_slice(&[0x80, 0x00, 0x00, 0x00, 0x00]); // 0.5 s
    frame.push(0); // reserved
    frame
}

/// Compat keyframe in the IPv4 broadcast envelope.
fn build_compat_keyframe(skew_num: u64, skew_denom: u64) -> Vec<u8> {
    let mut frame = eth_header(0x0800);
    // IPv4 header: IHL 5, proto 253, TTL 64, 0.0.0.0 -> broadcast
    frame.push(0x45);
    frame.push(0x00);
    frame.extend_from_slice(&(20u16 + 62).to_be_bytes()); // total length
    frame.extend_from_slice(&[0x00, 0x00]); // identification
    frame.extend_from_slice(&[0x00, 0x00]); // flags + fragment
    frame.push(64); // ttl
    frame.push(253); // protocol
    frame.extend_from_slice(&[0x00, 0x00]); // checksum
    frame.extend_from_slice(&[0, 0, 0, 0]); // src
    frame.extend_from_slice(&[255, 255, 255, 255]); // dst

    frame.extend_from_slice(&0x1234_5678u64.to_be_bytes()); // asic time
    frame.extend_from_slice(&KF_UTC_NANOS.to_be_bytes()); // utc
    frame.extend_from_slice(&0u64.to_be_bytes()); // last sync
    frame.extend_from_slice(&skew_num.to_be_bytes());
    frame.extend_from_slice(&skew_denom.to_be_bytes());
    frame.extend_from_slice(&0u64.to_be_bytes()); // timestamp
    frame.extend_from_slice(&0u64.to_be_bytes()); // drop count
    frame.extend_from_slice(&1u16.to_be_bytes()); // device id
    frame.extend_from_slice(&2u16.to_be_bytes()); // egress port
    frame.push(0); // fcs type
    frame.push(0); // reserved
    frame
}

fn record_for(frame: &[u8], clock: PsTime) -> RawRecord {
    RawRecord {
        status: ReadStatus::Ok,
        link_type: 1,
        len_capture: frame.len() as u32,
        len_orig: frame.len() as u32,
        clock_time: clock,
        is_real_time: false,
    }
}

fn process_frame(processor: &mut Processor, frame: &[u8], clock: PsTime) -> (ComputedTime, Vec<u8>) {
    let mut buffer = frame.to_vec();
    let record = record_for(frame, clock);
    let timed = processor.process(&record, &mut buffer);
    (timed, buffer)
}

#[test]
fn keyframe_updates_calibration_and_reports_utc() {
    let mut processor = Processor::new(ProcessOptions::default());
    let (timed, _) = process_frame(&mut processor, &build_keyframe(), kf_clock());

    assert_eq!(timed.status, Status::Ok);
    assert!(timed.is_keyframe);
    assert_eq!(timed.hw_time.nanos(), 1_694_420_480);
    // keyframes parse through the 32-bit path and latch it
    assert_eq!(processor.mode(), TimestampFormat::Bits32);
}

#[test]
fn tick_frame_offset4_is_timed_and_fcs_fixed() {
    let mut processor = Processor::new(ProcessOptions::default());
    process_frame(&mut processor, &build_keyframe(), kf_clock());

    // one millisecond after the keyframe, 198 ticks later
    let clock = PsTime::new(1_700_000_000, 1_000_000_000, 9);
    let frame = build_tick_frame(0x0ABC_DFB6);
    let (timed, buffer) = process_frame(&mut processor, &frame, clock);

    assert_eq!(timed.status, Status::Ok);
    assert!(!timed.is_keyframe);
    // 198 ticks at 350 MHz = 565 ns past the keyframe UTC
    assert_eq!(timed.hw_time.nanos(), 1_694_421_045);
    assert_eq!(processor.offset(), Some(4));

    // the tick replaced the FCS, so it was recomputed in place
    assert!(timed.fixed_fcs);
    let expected = fcs::crc32(&frame[..frame.len() - 4]);
    assert_eq!(&buffer[buffer.len() - 4..], &expected.to_le_bytes());
    assert!(fcs::has_valid_fcs(&buffer));
}

#[test]
fn tick_frame_without_fcs_fix_leaves_buffer_alone() {
    let options = ProcessOptions {
        fix_fcs: false,
        ..ProcessOptions::default()
    };
    let mut processor = Processor::new(options);
    process_frame(&mut processor, &build_keyframe(), kf_clock());

    let clock = PsTime::new(1_700_000_000, 1_000_000_000, 9);
    let frame = build_tick_frame(0x0ABC_DFB6);
    let (timed, buffer) = process_frame(&mut processor, &frame, clock);

    assert_eq!(timed.status, Status::Ok);
    assert!(!timed.fixed_fcs);
    assert_eq!(buffer, frame);
}

#[test]
fn stale_calibration_is_rejected() {
    let mut processor = Processor::new(ProcessOptions::default());
    process_frame(&mut processor, &build_keyframe(), kf_clock());

    // six seconds later the keyframe is stale
    let clock = PsTime::new(1_700_000_006, 0, 9);
    let (timed, _) = process_frame(&mut processor, &build_tick_frame(0x0ABC_DFB6), clock);

    assert_eq!(timed.status, Status::MissingRecentKeyframe);
    assert!(timed.status.is_recoverable());
}

#[test]
fn zero_tick_is_a_sentinel() {
    let options = ProcessOptions {
        offset: Some(4),
        format: TimestampFormat::Bits32,
        ..ProcessOptions::default()
    };
    let mut processor = Processor::new(options);
    process_frame(&mut processor, &build_keyframe(), kf_clock());

    let clock = PsTime::new(1_700_000_000, 1_000_000_000, 9);
    let (timed, _) = process_frame(&mut processor, &build_tick_frame(0), clock);
    assert_eq!(timed.status, Status::RecordTimeZero);
}

#[test]
fn trailer_frame_carries_device_and_port() {
    let options = ProcessOptions {
        format: TimestampFormat::Trailer,
        ..ProcessOptions::default()
    };
    let mut processor = Processor::new(options);

    let clock = PsTime::new(1_694_500_000, 0, 9);
    let frame = build_trailer_frame();
    let (timed, buffer) = process_frame(&mut processor, &frame, clock);

    assert_eq!(timed.status, Status::Ok);
    assert_eq!(timed.hw_time.sec, 1_694_420_480);
    assert_eq!(timed.hw_time.psec, 500_000_000_000);
    assert_eq!(timed.hw_time.precision, 12);
    assert_eq!(timed.device_id, Some(1));
    assert_eq!(timed.port, Some(2));
    assert_eq!(processor.offset(), Some(16));
    // trailer parsing never touches the buffer
    assert_eq!(buffer, frame);
}

#[test]
fn compat_keyframe_with_skew_is_fatal_and_leaves_state() {
    let mut processor = Processor::new(ProcessOptions::default());

    let (timed, _) = process_frame(&mut processor, &build_compat_keyframe(2, 1), kf_clock());
    assert_eq!(timed.status, Status::UnsupportedKeyframe);
    assert!(timed.status.is_fatal());

    // calibration never became valid, so data frames stay untimed
    let clock = PsTime::new(1_700_000_000, 1_000_000_000, 9);
    let (timed, _) = process_frame(&mut processor, &build_tick_frame(0x0ABC_DFB6), clock);
    assert_eq!(timed.status, Status::MissingRecentKeyframe);
}

#[test]
fn compat_keyframe_with_unity_skew_is_absorbed() {
    let mut processor = Processor::new(ProcessOptions::default());
    let (timed, _) = process_frame(&mut processor, &build_compat_keyframe(1, 1), kf_clock());
    assert_eq!(timed.status, Status::Ok);
    assert!(timed.is_keyframe);
    assert_eq!(timed.hw_time.nanos(), KF_UTC_NANOS as i64);
}

#[test]
fn truncated_record_is_rejected_regardless_of_contents() {
    let mut processor = Processor::new(ProcessOptions::default());
    let frame = build_keyframe();
    let mut buffer = frame.clone();
    let mut record = record_for(&frame, kf_clock());
    record.len_orig += 1;

    let timed = processor.process(&record, &mut buffer);
    assert_eq!(timed.status, Status::RecordTruncated);
    assert!(!timed.is_keyframe);
}

#[test]
fn auto_mode_latched_32bit_fails_trailer_frames() {
    let mut processor = Processor::new(ProcessOptions::default());

    // the keyframe parses in 32-bit mode and latches it
    let (timed, _) = process_frame(&mut processor, &build_keyframe(), kf_clock());
    assert_eq!(timed.status, Status::Ok);
    assert_eq!(processor.mode(), TimestampFormat::Bits32);

    // a trailer frame now fails the 32-bit offset heuristic
    let clock = PsTime::new(1_700_000_000, 1_000_000_000, 9);
    let (timed, _) = process_frame(&mut processor, &build_trailer_frame(), clock);
    assert_eq!(timed.status, Status::RecordTimeMissing);
    assert_eq!(processor.offset(), None);
}

#[test]
fn auto_mode_latches_trailer_and_stops_keyframe_recognition() {
    let mut processor = Processor::new(ProcessOptions::default());

    let clock = PsTime::new(1_694_500_000, 0, 9);
    let (timed, _) = process_frame(&mut processor, &build_trailer_frame(), clock);
    assert_eq!(timed.status, Status::Ok);
    assert_eq!(processor.mode(), TimestampFormat::Trailer);

    // keyframes are not recognized on a latched trailer stream
    let (timed, _) = process_frame(&mut processor, &build_keyframe(), clock);
    assert!(!timed.is_keyframe);
}

#[test]
fn capture_file_round_trip_preserves_nanos() {
    let temp = NamedTempFile::with_suffix(".pcap").unwrap();
    let path = temp.path().to_str().unwrap();

    let payload = build_tick_frame(0x0ABC_DFB6);
    {
        let mut writer = PcapFileWriter::create(path, false).unwrap();
        let hw = PsTime::new(1_700_000_000, 123_456_789_000, 9);
        writer
            .write_record(&hw, payload.len() as u32, payload.len() as u32, &payload)
            .unwrap();
    }

    let mut reader = PcapFileReader::open(path).unwrap();
    let mut buffer = [0u8; 256];
    let record = reader.next(&mut buffer);

    assert_eq!(record.status, ReadStatus::Ok);
    assert_eq!(record.clock_time.sec, 1_700_000_000);
    assert_eq!(record.clock_time.psec, 123_456_789_000);
    assert_eq!(record.clock_time.precision, 9);
    assert_eq!(record.len_capture as usize, payload.len());
    assert_eq!(&buffer[..payload.len()], &payload[..]);

    let record = reader.next(&mut buffer);
    assert_eq!(record.status, ReadStatus::Eof);
}

/// Write a two-record capture (keyframe + data frame) to `path`.
fn write_scenario_capture(path: &str) {
    let mut writer = PcapFileWriter::create(path, false).unwrap();

    let keyframe = build_keyframe();
    writer
        .write_record(
            &kf_clock(),
            keyframe.len() as u32,
            keyframe.len() as u32,
            &keyframe,
        )
        .unwrap();

    let data = build_tick_frame(0x0ABC_DFB6);
    let clock = PsTime::new(1_700_000_000, 1_000_000_000, 9);
    writer
        .write_record(&clock, data.len() as u32, data.len() as u32, &data)
        .unwrap();
}

#[test]
fn driver_retimes_a_capture_file() {
    let input = NamedTempFile::with_suffix(".pcap").unwrap();
    let output = NamedTempFile::with_suffix(".pcap").unwrap();
    let input_path = input.path().to_str().unwrap();
    let output_path = output.path().to_str().unwrap();
    write_scenario_capture(input_path);

    let mut source = Source::open(&ReadOptions {
        source: input_path.to_string(),
        promiscuous: false,
    })
    .unwrap();
    let mut sink = Sink::open(&WriteOptions {
        dest: output_path.to_string(),
        ..WriteOptions::default()
    })
    .unwrap();
    let mut processor = Processor::new(ProcessOptions::default());

    let stop = AtomicBool::new(false);
    let stats = driver::run(
        &mut source,
        &mut processor,
        &mut sink,
        &RunOptions::default(),
        &stop,
    )
    .unwrap();

    assert_eq!(stats.packets_in, 2);
    assert_eq!(stats.keyframes, 1);
    // the keyframe is suppressed; only the data frame is written
    assert_eq!(stats.packets_out, 1);
    assert_eq!(stats.errors, 0);
    drop(sink);

    let mut reader = PcapFileReader::open(output_path).unwrap();
    let mut buffer = [0u8; 256];
    let record = reader.next(&mut buffer);
    assert_eq!(record.status, ReadStatus::Ok);
    // 1_694_421_045 ns of reconstructed hardware time
    assert_eq!(record.clock_time.sec, 1);
    assert_eq!(record.clock_time.psec, 694_421_045_000);
}

#[test]
fn driver_writes_keyframes_when_asked() {
    let input = NamedTempFile::with_suffix(".pcap").unwrap();
    let output = NamedTempFile::with_suffix(".pcap").unwrap();
    let input_path = input.path().to_str().unwrap();
    let output_path = output.path().to_str().unwrap();
    write_scenario_capture(input_path);

    let mut source = Source::open(&ReadOptions {
        source: input_path.to_string(),
        promiscuous: false,
    })
    .unwrap();
    let mut sink = Sink::open(&WriteOptions {
        dest: output_path.to_string(),
        write_keyframes: true,
        ..WriteOptions::default()
    })
    .unwrap();
    let mut processor = Processor::new(ProcessOptions::default());

    let stop = AtomicBool::new(false);
    let options = RunOptions {
        write_all: true,
        ..RunOptions::default()
    };
    let stats = driver::run(&mut source, &mut processor, &mut sink, &options, &stop).unwrap();

    assert_eq!(stats.packets_out, 2);
}

#[test]
fn driver_honors_record_limit() {
    let input = NamedTempFile::with_suffix(".pcap").unwrap();
    let input_path = input.path().to_str().unwrap();
    {
        let mut writer = PcapFileWriter::create(input_path, false).unwrap();
        let keyframe = build_keyframe();
        for _ in 0..5 {
            writer
                .write_record(
                    &kf_clock(),
                    keyframe.len() as u32,
                    keyframe.len() as u32,
                    &keyframe,
                )
                .unwrap();
        }
    }

    let output = NamedTempFile::with_suffix(".pcap").unwrap();
    let output_path = output.path().to_str().unwrap();

    let mut source = Source::open(&ReadOptions {
        source: input_path.to_string(),
        promiscuous: false,
    })
    .unwrap();
    let mut sink = Sink::open(&WriteOptions {
        dest: output_path.to_string(),
        write_keyframes: true,
        ..WriteOptions::default()
    })
    .unwrap();
    let mut processor = Processor::new(ProcessOptions::default());

    let stop = AtomicBool::new(false);
    let options = RunOptions {
        count: 2,
        ..RunOptions::default()
    };
    let stats = driver::run(&mut source, &mut processor, &mut sink, &options, &stop).unwrap();

    assert_eq!(stats.packets_out, 2);
    assert!(stats.packets_in <= 3);
}
