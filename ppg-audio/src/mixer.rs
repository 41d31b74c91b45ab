//! The stereo mixer: a live voice pool summed per output block.

use ppg_types::voice::Voice;

/// Constant-power pan law: pan in [-1, 1] -> (left gain, right gain).
pub fn constant_power_pan(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    let angle = (pan + 1.0) * std::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// A loop's identity within the mixer, so a later `/loop/stop` (or an
/// eviction by the loop manager) can silence the right voice. Plain one-shot
/// voices carry no tag.
pub type LoopTag = u8;

struct Playing {
    tag: Option<LoopTag>,
    voice: Voice,
}

/// Holds the live voice set and sums them into an output block. Starting a
/// new voice never stops another: every overlapping voice keeps sounding.
#[derive(Default)]
pub struct Mixer {
    voices: Vec<Playing>,
}

impl Mixer {
    pub fn new() -> Self {
        Self { voices: Vec::new() }
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Queue a new untagged (one-shot) voice. Does not affect any
    /// currently-playing voice.
    pub fn play(&mut self, voice: Voice) {
        self.voices.push(Playing { tag: None, voice });
    }

    /// Queue a tagged voice (a loop). `stop_tag` later silences it by tag.
    pub fn play_tagged(&mut self, tag: LoopTag, voice: Voice) {
        self.voices.push(Playing {
            tag: Some(tag),
            voice,
        });
    }

    /// Remove every voice carrying `tag`. Idempotent: stopping a tag with
    /// no matching voice is a no-op.
    pub fn stop_tag(&mut self, tag: LoopTag) {
        self.voices.retain(|p| p.tag != Some(tag));
    }

    pub fn is_tag_active(&self, tag: LoopTag) -> bool {
        self.voices.iter().any(|p| p.tag == Some(tag))
    }

    /// Render `frames` stereo frames into `out` (interleaved L/R, length
    /// `frames * 2`), summing and advancing every live voice, then
    /// dropping finished ones.
    pub fn render(&mut self, out: &mut [f32], frames: usize) {
        out[..frames * 2].fill(0.0);

        for playing in &mut self.voices {
            let voice = &mut playing.voice;
            let (left_gain, right_gain) = constant_power_pan(voice.pan);
            let intensity = voice.intensity.unwrap_or(1.0);
            for frame in 0..frames {
                if voice.position >= voice.source.len() {
                    if voice.looping && !voice.source.is_empty() {
                        voice.position = 0;
                    } else {
                        break;
                    }
                }
                let sample = voice.source[voice.position] * intensity;
                out[frame * 2] += sample * left_gain;
                out[frame * 2 + 1] += sample * right_gain;
                voice.position += 1;
            }
        }

        self.voices.retain(|p| !p.voice.is_finished());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn centered_pan_is_equal_power_both_channels() {
        let (l, r) = constant_power_pan(0.0);
        assert!((l - r).abs() < 1e-5);
        assert!((l * l + r * r - 1.0).abs() < 1e-5);
    }

    #[test]
    fn full_left_silences_right_channel() {
        let (l, r) = constant_power_pan(-1.0);
        assert!(l > 0.99);
        assert!(r < 0.01);
    }

    #[test]
    fn overlapping_voices_both_keep_playing() {
        let mut mixer = Mixer::new();
        mixer.play(Voice::new(Arc::new(vec![1.0; 4]), 0.0, None));
        mixer.play(Voice::new(Arc::new(vec![1.0; 4]), 0.0, None));
        assert_eq!(mixer.voice_count(), 2);

        let mut out = vec![0.0; 8];
        mixer.render(&mut out, 4);
        // Both voices sum: each contributes ~0.707 at full gain center pan.
        assert!(out[0] > 1.2);
        assert_eq!(mixer.voice_count(), 2);
    }

    #[test]
    fn finished_voices_are_dropped() {
        let mut mixer = Mixer::new();
        mixer.play(Voice::new(Arc::new(vec![1.0; 2]), 0.0, None));
        let mut out = vec![0.0; 8];
        mixer.render(&mut out, 4);
        assert_eq!(mixer.voice_count(), 0);
    }

    #[test]
    fn intensity_scales_gain() {
        let mut mixer = Mixer::new();
        mixer.play(Voice::new(Arc::new(vec![1.0; 4]), 0.0, Some(0.5)));
        let mut out = vec![0.0; 8];
        mixer.render(&mut out, 4);
        assert!(out[0] < 0.5);
    }

    #[test]
    fn looping_voice_wraps_instead_of_finishing() {
        let mut mixer = Mixer::new();
        mixer.play_tagged(3, Voice::looping(Arc::new(vec![1.0; 2])));
        let mut out = vec![0.0; 16];
        mixer.render(&mut out, 8);
        assert_eq!(mixer.voice_count(), 1);
        assert!(mixer.is_tag_active(3));
    }

    #[test]
    fn stop_tag_silences_only_the_matching_loop() {
        let mut mixer = Mixer::new();
        mixer.play_tagged(1, Voice::looping(Arc::new(vec![1.0; 2])));
        mixer.play_tagged(2, Voice::looping(Arc::new(vec![1.0; 2])));
        mixer.stop_tag(1);
        assert!(!mixer.is_tag_active(1));
        assert!(mixer.is_tag_active(2));
    }
}
