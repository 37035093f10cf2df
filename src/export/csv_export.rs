//! Tab-separated output files.
//!
//! Every file starts with `#` comment lines naming the producer, the time it
//! was written and the column order, followed by one record per line.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::elements::log_ratio;
use crate::error::Result;
use crate::multizone::MultizoneCoordinator;
use crate::zone::ZoneStepper;

/// Buffered writer for one output file
pub struct TableWriter {
    writer: csv::Writer<BufWriter<File>>,
    path: PathBuf,
    rows: usize,
}

impl TableWriter {
    /// Create the file and write its comment header
    pub fn create(path: &Path, title: &str, columns: &[String]) -> Result<Self> {
        let mut file = BufWriter::new(File::create(path)?);
        writeln!(file, "# galchem {}", title)?;
        writeln!(file, "# written {}", Local::now().to_rfc3339())?;
        writeln!(file, "# {}", columns.join("\t"))?;
        let writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(file);
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    pub fn write_values(&mut self, values: &[f64]) -> Result<()> {
        self.writer.serialize(values)?;
        self.rows += 1;
        Ok(())
    }

    pub fn write_fields(&mut self, fields: &[String]) -> Result<()> {
        self.writer.write_record(fields)?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and return the path and number of records written
    pub fn finish(mut self) -> Result<(PathBuf, usize)> {
        self.writer.flush()?;
        log::debug!("wrote {} rows to {}", self.rows, self.path.display());
        Ok((self.path, self.rows))
    }
}

/// `log10(a / b)`, or -inf when undefined
fn bracket(a: f64, b: f64) -> f64 {
    log_ratio(a, b).unwrap_or(f64::NEG_INFINITY)
}

pub fn history_columns(symbols: &[String]) -> Vec<String> {
    let mut columns: Vec<String> = [
        "time", "lookback", "mgas", "mstar", "sfr", "ifr", "ofr", "eta_0", "r_eff",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();
    columns.extend(symbols.iter().map(|s| format!("mass({})", s)));
    columns.extend(symbols.iter().map(|s| format!("z({})", s)));
    columns.extend(symbols.iter().map(|s| format!("[{}/h]", s)));
    for i in 0..symbols.len() {
        for j in (i + 1)..symbols.len() {
            columns.push(format!("[{}/{}]", symbols[i], symbols[j]));
        }
    }
    columns.push("z".to_string());
    columns.push("[m/h]".to_string());
    columns
}

/// `history.out`: one row per snapshot
pub fn write_history(path: &Path, zone: &ZoneStepper) -> Result<usize> {
    let symbols = zone.config().symbols();
    let solar = zone.solar_abundances();
    let solar_z = zone.config().solar_z;
    let end = zone.grid().end_time_gyr();
    let mut writer = TableWriter::create(
        path,
        &format!("history of zone '{}'", zone.name()),
        &history_columns(&symbols),
    )?;

    let n = symbols.len();
    let mut row = Vec::with_capacity(9 + 3 * n + n * n / 2 + 2);
    for snap in zone.history() {
        row.clear();
        row.extend_from_slice(&[
            snap.time_gyr,
            end - snap.time_gyr,
            snap.gas_msun,
            snap.stars_msun,
            snap.rates.sfr,
            snap.rates.infall,
            snap.rates.outflow,
            snap.rates.eta,
            snap.r_eff(),
        ]);
        row.extend_from_slice(&snap.element_masses);
        let abundances: Vec<f64> = (0..n).map(|i| snap.abundance(i)).collect();
        row.extend_from_slice(&abundances);
        let x_h: Vec<f64> = (0..n).map(|i| bracket(abundances[i], solar[i])).collect();
        row.extend_from_slice(&x_h);
        for i in 0..n {
            for j in (i + 1)..n {
                row.push(x_h[i] - x_h[j]);
            }
        }
        row.push(snap.metallicity);
        row.push(bracket(snap.metallicity, solar_z));
        writer.write_values(&row)?;
    }
    Ok(writer.finish()?.1)
}

/// `mdf.out`: normalized distributions, one row per bin
pub fn write_mdf(path: &Path, zone: &ZoneStepper) -> Result<usize> {
    let mdf = zone.mdf();
    let mut columns = vec!["bin_edge_left".to_string(), "bin_edge_right".to_string()];
    columns.extend(mdf.labels().iter().cloned());
    let mut writer = TableWriter::create(
        path,
        &format!("stellar metallicity distribution of zone '{}'", zone.name()),
        &columns,
    )?;

    let histograms = mdf.normalized();
    let mut row = Vec::with_capacity(columns.len());
    for (b, edges) in mdf.bins().windows(2).enumerate() {
        row.clear();
        row.push(edges[0]);
        row.push(edges[1]);
        row.extend(histograms.iter().map(|h| h[b]));
        writer.write_values(&row)?;
    }
    Ok(writer.finish()?.1)
}

/// `tracers.out`: birth and final zone, age and composition of every tracer
pub fn write_tracers(path: &Path, model: &MultizoneCoordinator) -> Result<usize> {
    let symbols = model
        .zones()
        .first()
        .map(|z| z.config().symbols())
        .unwrap_or_default();
    let mut columns: Vec<String> = ["zone_origin", "zone_final", "formation_time", "mass", "z", "z_height"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    columns.extend(symbols.iter().map(|s| format!("z({})", s)));
    let mut writer = TableWriter::create(path, &format!("tracers of '{}'", model.name()), &columns)?;

    let mut fields = Vec::with_capacity(columns.len());
    for tracer in model.tracers().iter() {
        fields.clear();
        fields.push(tracer.birth_zone.to_string());
        fields.push(tracer.final_zone.to_string());
        fields.push(format!("{}", tracer.formation_time_gyr));
        fields.push(format!("{:e}", tracer.mass_msun));
        fields.push(format!("{:e}", tracer.metallicity));
        fields.push(tracer.z_height_kpc.map_or_else(|| "nan".to_string(), |h| format!("{}", h)));
        fields.extend(tracer.abundances.iter().map(|z| format!("{:e}", z)));
        writer.write_fields(&fields)?;
    }
    Ok(writer.finish()?.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_columns() {
        let symbols = vec!["fe".to_string(), "o".to_string(), "sr".to_string()];
        let columns = history_columns(&symbols);
        assert_eq!(columns[0], "time");
        assert!(columns.contains(&"mass(sr)".to_string()));
        assert!(columns.contains(&"[fe/o]".to_string()));
        assert!(columns.contains(&"[o/sr]".to_string()));
        assert_eq!(columns.last().unwrap(), "[m/h]");
        assert_eq!(columns.len(), 9 + 3 * 3 + 3 + 2);
    }

    #[test]
    fn test_bracket_floor() {
        assert_eq!(bracket(0.0, 1.0), f64::NEG_INFINITY);
        assert!((bracket(10.0, 1.0) - 1.0).abs() < 1e-15);
    }
}
