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

use std::path::Path;
use std::time::Duration;

/// The file name part of a path, or a placeholder if it isn't valid UTF-8.
pub fn filename_display(path: &Path) -> &str {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("unreadable file name")
}

/// Formats a sample length as seconds with tenths, with minutes once it's
/// long enough: "0.5s", "12.3s", "1:02.5".
pub fn duration_display(duration: Duration) -> String {
    let tenths = duration.as_millis() / 100;
    let minutes = tenths / 600;
    let seconds = (tenths % 600) / 10;
    let tenth = tenths % 10;
    if minutes == 0 {
        format!("{}.{}s", seconds, tenth)
    } else {
        format!("{}:{:02}.{}", minutes, seconds, tenth)
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;
    use std::time::Duration;

    use crate::util::{duration_display, filename_display};

    #[test]
    fn test_duration_display() {
        assert_eq!("0.0s", duration_display(Duration::ZERO));
        assert_eq!("0.5s", duration_display(Duration::from_millis(540)));
        assert_eq!("2.0s", duration_display(Duration::from_secs(2)));
        assert_eq!("59.9s", duration_display(Duration::from_millis(59_999)));
        assert_eq!("1:00.0", duration_display(Duration::from_secs(60)));
        assert_eq!("1:02.5", duration_display(Duration::from_millis(62_500)));
    }

    #[test]
    fn test_filename_display() {
        assert_eq!(
            "sample_1_1.wav",
            filename_display(Path::new("/tmp/recordings/sample_1_1.wav"))
        );
        assert_eq!("unreadable file name", filename_display(Path::new("/")));
    }
}
