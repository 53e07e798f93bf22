//! Bounds command: the observation window of a release.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rh_core::{BoundsKind, ReleaseBounds, ReleaseVersion, release_bounds};

use super::util;
use crate::Config;

pub fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    version: &ReleaseVersion,
    project: Option<u64>,
    json: bool,
) -> Result<()> {
    let client = util::client(config)?;
    let release = util::runtime()?
        .block_on(client.release(version, project))
        .with_context(|| format!("failed to fetch release {version}"))?;
    let bounds = release_bounds(&release, Utc::now());

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&bounds)?)?;
    } else {
        write!(writer, "{}", format_bounds(version, &bounds))?;
    }
    Ok(())
}

const fn kind_note(kind: BoundsKind) -> &'static str {
    match kind {
        BoundsKind::Normal => "",
        BoundsKind::Clamped => " (start clamped to retention)",
        BoundsKind::Ancient => " (no data within retention)",
    }
}

pub fn format_bounds(version: &ReleaseVersion, bounds: &ReleaseBounds) -> String {
    format!(
        "Release {version}{note}\nStart: {start}\nEnd:   {end}\n",
        note = kind_note(bounds.kind),
        start = bounds
            .release_start
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        end = bounds.release_end.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_render_kind_note() {
        let bounds = ReleaseBounds {
            release_start: "2021-03-01T10:00:00Z".parse().unwrap(),
            release_end: "2021-03-04T18:30:59.999Z".parse().unwrap(),
            kind: BoundsKind::Clamped,
        };
        let version = ReleaseVersion::new("backend@1.2.0").unwrap();
        assert_eq!(
            format_bounds(&version, &bounds),
            "Release backend@1.2.0 (start clamped to retention)\n\
             Start: 2021-03-01T10:00:00Z\n\
             End:   2021-03-04T18:30:59Z\n"
        );
    }
}
