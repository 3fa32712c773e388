use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};

use log::error;

use super::FindError;

pub type KeyValues = BTreeMap<String, String>;

/// Reads `key: value` lines. Values run to the end of the line.
pub fn read(input: impl Read) -> Result<KeyValues, FindError> {
    let mut kv = KeyValues::new();

    for line in BufReader::new(input).lines() {
        let line = line.map_err(|e| {
            error!("couldn't read line: {e}");
            FindError::Internal
        })?;

        if line.is_empty() {
            continue;
        }

        let (k, v) = line.split_once(':').ok_or_else(|| {
            error!("invalid line, can't split");
            FindError::Internal
        })?;

        let Some(v) = v.strip_prefix(' ') else {
            error!("invalid line - no whitespace after colon");
            return Err(FindError::Internal);
        };

        kv.insert(k.into(), v.into());
    }

    Ok(kv)
}

pub fn write(mut output: impl Write, keyvalues: &KeyValues) -> Result<(), std::io::Error> {
    for (k, v) in keyvalues {
        writeln!(output, "{}: {}", k, v)?;
    }
    Ok(())
}
