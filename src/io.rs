//! Plain text output of a finished calculation.
use log::info;
use ndarray::*;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::integrate::BcdResult;
use crate::parallel::Collective;

/// Name of the tensor table inside the output directory.
pub const BCD_FILE: &str = "bcd.dat";
/// Name of the hot point list inside the output directory.
pub const KPOINT_LIST_FILE: &str = "kpoint_list";

/// Formats `data` row by row with eight decimals, sign aligned.
pub fn format_table<S: Data<Elem = f64>>(data: &ArrayBase<S, Ix2>) -> String {
    let mut s0 = String::new();
    for row in data.outer_iter() {
        for x in row.iter() {
            if *x >= 0.0 {
                s0.push_str("     ");
            } else {
                s0.push_str("    ");
            }
            s0.push_str(&format!("{:.8}", x));
        }
        s0.push('\n');
    }
    s0
}

pub fn write_txt<S: Data<Elem = f64>>(data: &ArrayBase<S, Ix2>, output: &Path) -> Result<()> {
    let mut file = File::create(output)?;
    file.write_all(format_table(data).as_bytes())?;
    Ok(())
}

impl BcdResult {
    /// Writes [`BCD_FILE`] and [`KPOINT_LIST_FILE`] into `dir`, creating it if needed.
    pub fn write_to<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        write_txt(&self.bcd, &dir.join(BCD_FILE))?;
        write_txt(&self.hot_points, &dir.join(KPOINT_LIST_FILE))?;
        info!(
            "wrote {} energies and {} hot k points to {}",
            self.bcd.nrows(),
            self.hot_points.nrows(),
            dir.display()
        );
        Ok(())
    }

    /// [`BcdResult::write_to`] on the root rank, nothing elsewhere.
    pub fn output<C, P>(&self, comm: &C, dir: P) -> Result<()>
    where
        C: Collective + ?Sized,
        P: AsRef<Path>,
    {
        if comm.is_root() {
            self.write_to(dir)
        } else {
            Ok(())
        }
    }
}
