// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::{error::Error, fmt, str::FromStr};

/// Sample format enumeration for audio processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Integer samples (e.g., 16-bit, 24-bit, 32-bit)
    Int,
    /// Floating point samples (e.g., 32-bit float)
    Float,
}

impl FromStr for SampleFormat {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        match s {
            "float" | "Float" => Ok(SampleFormat::Float),
            "int" | "Int" => Ok(SampleFormat::Int),
            _ => Err(format!("Unsupported sample format: {}", s).into()),
        }
    }
}

impl SampleFormat {
    /// Convert to string representation
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::Float => "float",
            SampleFormat::Int => "int",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The native format of an active hardware session. Capture files are written
/// with the input side of this format, and the mixer renders the output side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionFormat {
    /// Sample rate in Hz shared by input and output.
    pub sample_rate: u32,
    /// Number of hardware input channels.
    pub input_channels: u16,
    /// Number of hardware output channels.
    pub output_channels: u16,
}

impl SessionFormat {
    /// Creates a new SessionFormat.
    pub fn new(
        sample_rate: u32,
        input_channels: u16,
        output_channels: u16,
    ) -> Result<Self, Box<dyn Error>> {
        if sample_rate == 0 {
            return Err("Sample rate must be greater than 0".into());
        }
        if input_channels == 0 || output_channels == 0 {
            return Err("Session must have at least one input and one output channel".into());
        }

        Ok(SessionFormat {
            sample_rate,
            input_channels,
            output_channels,
        })
    }
}

impl fmt::Display for SessionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} in / {} out",
            self.sample_rate, self.input_channels, self.output_channels
        )
    }
}

/// Sample encoding used for capture files. Rate and channel count always come
/// from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    /// Sample format (integer or float)
    pub sample_format: SampleFormat,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl CaptureFormat {
    /// Creates a new CaptureFormat, rejecting encodings WAV cannot hold.
    pub fn new(sample_format: SampleFormat, bits_per_sample: u16) -> Result<Self, Box<dyn Error>> {
        match (sample_format, bits_per_sample) {
            (SampleFormat::Float, 32) | (SampleFormat::Int, 16 | 24 | 32) => Ok(CaptureFormat {
                sample_format,
                bits_per_sample,
            }),
            _ => Err(format!(
                "Unsupported capture format: {} bits {}",
                bits_per_sample, sample_format
            )
            .into()),
        }
    }

    /// The hound spec for a capture in this encoding at the given session format.
    pub fn wav_spec(&self, session: &SessionFormat) -> hound::WavSpec {
        hound::WavSpec {
            channels: session.input_channels,
            sample_rate: session.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: match self.sample_format {
                SampleFormat::Float => hound::SampleFormat::Float,
                SampleFormat::Int => hound::SampleFormat::Int,
            },
        }
    }
}

impl Default for CaptureFormat {
    /// 32-bit float, which holds the hardware signal without requantizing.
    fn default() -> Self {
        CaptureFormat {
            sample_format: SampleFormat::Float,
            bits_per_sample: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_format_from_str() {
        assert_eq!(
            SampleFormat::from_str("float").unwrap(),
            SampleFormat::Float
        );
        assert_eq!(
            SampleFormat::from_str("Float").unwrap(),
            SampleFormat::Float
        );
        assert_eq!(SampleFormat::from_str("int").unwrap(), SampleFormat::Int);
        assert!(SampleFormat::from_str("double").is_err());
        assert!(SampleFormat::from_str("").is_err());
    }

    #[test]
    fn test_sample_format_display() {
        assert_eq!(format!("{}", SampleFormat::Float), "float");
        assert_eq!(format!("{}", SampleFormat::Int), "int");
    }

    #[test]
    fn test_session_format_new() {
        let format = SessionFormat::new(48000, 1, 2).unwrap();
        assert_eq!(format.sample_rate, 48000);
        assert_eq!(format.input_channels, 1);
        assert_eq!(format.output_channels, 2);
        assert_eq!(format.to_string(), "48000 Hz, 1 in / 2 out");

        assert!(SessionFormat::new(0, 1, 2).is_err());
        assert!(SessionFormat::new(44100, 0, 2).is_err());
        assert!(SessionFormat::new(44100, 2, 0).is_err());
    }

    #[test]
    fn test_capture_format() {
        assert_eq!(
            CaptureFormat::default(),
            CaptureFormat::new(SampleFormat::Float, 32).unwrap()
        );
        assert!(CaptureFormat::new(SampleFormat::Int, 16).is_ok());
        assert!(CaptureFormat::new(SampleFormat::Int, 24).is_ok());
        assert!(CaptureFormat::new(SampleFormat::Float, 16).is_err());
        assert!(CaptureFormat::new(SampleFormat::Int, 8).is_err());
    }

    #[test]
    fn test_capture_wav_spec() {
        let session = SessionFormat::new(48000, 2, 2).unwrap();
        let spec = CaptureFormat::new(SampleFormat::Int, 16)
            .unwrap()
            .wav_spec(&session);
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);
    }
}
