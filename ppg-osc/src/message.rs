//! Typed OSC message vocabulary built on top of `rosc`.
//!
//! Callers outside this crate never construct a `rosc::OscMessage` by
//! hand. Unknown addresses and malformed argument vectors decode to `None`
//! rather than erroring; receivers must tolerate unknown addresses and
//! surplus arguments.

use ppg_types::{ChannelId, LightingProgramKind};
use rosc::{OscMessage, OscPacket, OscType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerStatusKind {
    Recording,
    Assignment,
    Playback,
}

impl SamplerStatusKind {
    fn addr_suffix(self) -> &'static str {
        match self {
            SamplerStatusKind::Recording => "recording",
            SamplerStatusKind::Assignment => "assignment",
            SamplerStatusKind::Playback => "playback",
        }
    }
}

/// One decoded/encodable message on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    Ppg {
        channel: ChannelId,
        values: [u16; 5],
        ts_ms: u64,
    },
    Beat {
        channel: ChannelId,
        ts_ms: u64,
        bpm: f32,
        intensity: f32,
    },
    Acquire {
        channel: ChannelId,
        ts_ms: u64,
        bpm: f32,
    },
    Release {
        channel: ChannelId,
        ts_ms: u64,
    },
    Route {
        channel: ChannelId,
        sample_index: u8,
    },
    LoopStart(u8),
    LoopStop(u8),
    LoopToggle(u8),
    LoopMomentary {
        id: u8,
        state: bool,
    },
    Select {
        channel: ChannelId,
        column: u8,
    },
    Led {
        row: u8,
        col: u8,
        color: u8,
        mode: u8,
    },
    SamplerRecordToggle {
        src: u8,
    },
    SamplerAssign {
        dest: u8,
    },
    SamplerToggle {
        dest: u8,
    },
    SamplerStatus {
        kind: SamplerStatusKind,
        channel: u8,
        active: bool,
    },
    LightingProgram(LightingProgramKind),
}

fn as_int(arg: &OscType) -> Option<i64> {
    match arg {
        OscType::Int(v) => Some(*v as i64),
        OscType::Long(v) => Some(*v),
        _ => None,
    }
}

fn as_float(arg: &OscType) -> Option<f32> {
    match arg {
        OscType::Float(v) => Some(*v),
        OscType::Double(v) => Some(*v as f32),
        OscType::Int(v) => Some(*v as f32),
        _ => None,
    }
}

/// Split `/ppg/3` into `("/ppg", 3)`; returns `None` if the trailing segment
/// isn't a valid channel digit.
fn split_trailing_u8(addr: &str) -> Option<(&str, u8)> {
    let idx = addr.rfind('/')?;
    let (prefix, tail) = addr.split_at(idx);
    let tail = &tail[1..];
    let n: u8 = tail.parse().ok()?;
    Some((prefix, n))
}

impl BusMessage {
    /// Decode a raw OSC message. Returns `None` for addresses this bus
    /// doesn't recognize or argument vectors that don't match: the caller
    /// drops the message and moves on (input-rejected, logged by the
    /// caller, not here).
    pub fn decode(msg: &OscMessage) -> Option<BusMessage> {
        let addr = msg.addr.as_str();
        let args = &msg.args;

        if let Some((prefix, ch)) = split_trailing_u8(addr) {
            let channel = ChannelId::new(ch)?;
            match prefix {
                "/ppg" => {
                    if args.len() < 6 {
                        return None;
                    }
                    let mut values = [0u16; 5];
                    for i in 0..5 {
                        values[i] = as_int(&args[i])?.clamp(0, u16::MAX as i64) as u16;
                    }
                    let ts_ms = as_int(&args[5])?.max(0) as u64;
                    return Some(BusMessage::Ppg {
                        channel,
                        values,
                        ts_ms,
                    });
                }
                "/beat" => {
                    if args.len() < 3 {
                        return None;
                    }
                    let ts_ms = as_int(&args[0])?.max(0) as u64;
                    let bpm = as_float(&args[1])?;
                    let intensity = as_float(&args[2])?;
                    return Some(BusMessage::Beat {
                        channel,
                        ts_ms,
                        bpm,
                        intensity,
                    });
                }
                "/acquire" => {
                    if args.len() < 2 {
                        return None;
                    }
                    let ts_ms = as_int(&args[0])?.max(0) as u64;
                    let bpm = as_float(&args[1])?;
                    return Some(BusMessage::Acquire {
                        channel,
                        ts_ms,
                        bpm,
                    });
                }
                "/release" => {
                    let ts_ms = as_int(args.first()?)?.max(0) as u64;
                    return Some(BusMessage::Release { channel, ts_ms });
                }
                "/route" => {
                    let sample_index = as_int(args.first()?)?.clamp(0, 7) as u8;
                    return Some(BusMessage::Route {
                        channel,
                        sample_index,
                    });
                }
                "/select" => {
                    let column = as_int(args.first()?)?.clamp(0, 7) as u8;
                    return Some(BusMessage::Select { channel, column });
                }
                _ => {}
            }
        }

        match addr {
            "/loop/start" => Some(BusMessage::LoopStart(as_int(args.first()?)?.clamp(0, 31) as u8)),
            "/loop/stop" => Some(BusMessage::LoopStop(as_int(args.first()?)?.clamp(0, 31) as u8)),
            "/loop/toggle" => Some(BusMessage::LoopToggle(
                as_int(args.first()?)?.clamp(0, 31) as u8
            )),
            "/loop/momentary" => {
                if args.len() < 2 {
                    return None;
                }
                let id = as_int(&args[0])?.clamp(0, 31) as u8;
                let state = as_int(&args[1])? != 0;
                Some(BusMessage::LoopMomentary { id, state })
            }
            "/sampler/record/toggle" => Some(BusMessage::SamplerRecordToggle {
                src: as_int(args.first()?)?.clamp(0, 3) as u8,
            }),
            "/sampler/assign" => Some(BusMessage::SamplerAssign {
                dest: as_int(args.first()?)?.clamp(4, 7) as u8,
            }),
            "/sampler/toggle" => Some(BusMessage::SamplerToggle {
                dest: as_int(args.first()?)?.clamp(4, 7) as u8,
            }),
            "/sampler/status/recording" => decode_sampler_status(SamplerStatusKind::Recording, args),
            "/sampler/status/assignment" => {
                decode_sampler_status(SamplerStatusKind::Assignment, args)
            }
            "/sampler/status/playback" => decode_sampler_status(SamplerStatusKind::Playback, args),
            "/lighting/program" => {
                let index = as_int(args.first()?)?.clamp(0, 7) as u8;
                LightingProgramKind::from_index(index).map(BusMessage::LightingProgram)
            }
            _ => {
                if let Some(rest) = addr.strip_prefix("/led/") {
                    let mut parts = rest.split('/');
                    let row: u8 = parts.next()?.parse().ok()?;
                    let col: u8 = parts.next()?.parse().ok()?;
                    if args.len() < 2 {
                        return None;
                    }
                    let color = as_int(&args[0])?.clamp(0, 127) as u8;
                    let mode = as_int(&args[1])?.clamp(0, 2) as u8;
                    return Some(BusMessage::Led {
                        row,
                        col,
                        color,
                        mode,
                    });
                }
                None
            }
        }
    }

    /// Encode into a `rosc::OscPacket` ready for `rosc::encoder::encode`.
    pub fn encode(&self) -> OscPacket {
        let (addr, args) = match self {
            BusMessage::Ppg {
                channel,
                values,
                ts_ms,
            } => {
                let mut args: Vec<OscType> = values.iter().map(|v| OscType::Int(*v as i32)).collect();
                args.push(OscType::Long(*ts_ms as i64));
                (format!("/ppg/{}", channel.raw()), args)
            }
            BusMessage::Beat {
                channel,
                ts_ms,
                bpm,
                intensity,
            } => (
                format!("/beat/{}", channel.raw()),
                vec![
                    OscType::Long(*ts_ms as i64),
                    OscType::Float(*bpm),
                    OscType::Float(*intensity),
                ],
            ),
            BusMessage::Acquire {
                channel,
                ts_ms,
                bpm,
            } => (
                format!("/acquire/{}", channel.raw()),
                vec![OscType::Long(*ts_ms as i64), OscType::Float(*bpm)],
            ),
            BusMessage::Release { channel, ts_ms } => (
                format!("/release/{}", channel.raw()),
                vec![OscType::Long(*ts_ms as i64)],
            ),
            BusMessage::Route {
                channel,
                sample_index,
            } => (
                format!("/route/{}", channel.raw()),
                vec![OscType::Int(*sample_index as i32)],
            ),
            BusMessage::LoopStart(id) => ("/loop/start".to_string(), vec![OscType::Int(*id as i32)]),
            BusMessage::LoopStop(id) => ("/loop/stop".to_string(), vec![OscType::Int(*id as i32)]),
            BusMessage::LoopToggle(id) => {
                ("/loop/toggle".to_string(), vec![OscType::Int(*id as i32)])
            }
            BusMessage::LoopMomentary { id, state } => (
                "/loop/momentary".to_string(),
                vec![OscType::Int(*id as i32), OscType::Int(*state as i32)],
            ),
            BusMessage::Select { channel, column } => (
                format!("/select/{}", channel.raw()),
                vec![OscType::Int(*column as i32)],
            ),
            BusMessage::Led {
                row,
                col,
                color,
                mode,
            } => (
                format!("/led/{row}/{col}"),
                vec![OscType::Int(*color as i32), OscType::Int(*mode as i32)],
            ),
            BusMessage::SamplerRecordToggle { src } => (
                "/sampler/record/toggle".to_string(),
                vec![OscType::Int(*src as i32)],
            ),
            BusMessage::SamplerAssign { dest } => (
                "/sampler/assign".to_string(),
                vec![OscType::Int(*dest as i32)],
            ),
            BusMessage::SamplerToggle { dest } => (
                "/sampler/toggle".to_string(),
                vec![OscType::Int(*dest as i32)],
            ),
            BusMessage::SamplerStatus {
                kind,
                channel,
                active,
            } => (
                format!("/sampler/status/{}", kind.addr_suffix()),
                vec![OscType::Int(*channel as i32), OscType::Int(*active as i32)],
            ),
            BusMessage::LightingProgram(kind) => (
                "/lighting/program".to_string(),
                vec![OscType::Int(kind.as_index() as i32)],
            ),
        };
        OscPacket::Message(OscMessage { addr, args })
    }
}

fn decode_sampler_status(kind: SamplerStatusKind, args: &[OscType]) -> Option<BusMessage> {
    if args.len() < 2 {
        return None;
    }
    let channel = as_int(&args[0])?.clamp(0, 255) as u8;
    let active = as_int(&args[1])? != 0;
    Some(BusMessage::SamplerStatus {
        kind,
        channel,
        active,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: BusMessage) -> BusMessage {
        let packet = msg.encode();
        let OscPacket::Message(raw) = packet else {
            panic!("expected message")
        };
        BusMessage::decode(&raw).expect("decodes")
    }

    #[test]
    fn ppg_roundtrip() {
        let ch = ChannelId::new(2).unwrap();
        let msg = BusMessage::Ppg {
            channel: ch,
            values: [100, 200, 300, 400, 500],
            ts_ms: 123_456,
        };
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn beat_roundtrip() {
        let ch = ChannelId::new(0).unwrap();
        let msg = BusMessage::Beat {
            channel: ch,
            ts_ms: 1_700_000_000_000,
            bpm: 75.0,
            intensity: 1.0,
        };
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn lighting_program_roundtrip() {
        let msg = BusMessage::LightingProgram(LightingProgramKind::Convergence);
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn unknown_address_decodes_to_none() {
        let raw = OscMessage {
            addr: "/totally/unknown".to_string(),
            args: vec![OscType::Int(1)],
        };
        assert!(BusMessage::decode(&raw).is_none());
    }

    #[test]
    fn surplus_arguments_are_tolerated() {
        let raw = OscMessage {
            addr: "/loop/start".to_string(),
            args: vec![OscType::Int(3), OscType::String("extra".into())],
        };
        assert_eq!(BusMessage::decode(&raw), Some(BusMessage::LoopStart(3)));
    }

    #[test]
    fn led_address_parses_row_and_col() {
        let raw = OscMessage {
            addr: "/led/2/5".to_string(),
            args: vec![OscType::Int(64), OscType::Int(1)],
        };
        assert_eq!(
            BusMessage::decode(&raw),
            Some(BusMessage::Led {
                row: 2,
                col: 5,
                color: 64,
                mode: 1
            })
        );
    }
}
