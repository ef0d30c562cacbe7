//! Melting temperature, GC content and homopolymer runs
//!
//! Tm uses the SantaLucia (1998) unified nearest-neighbour parameters with a
//! monovalent-equivalent salt correction (Na + 120·sqrt(Mg - dNTP), von Ahsen
//! 2001) applied to the entropy term. Degenerate symbols contribute the mean
//! of their concrete expansions.

use once_cell::sync::Lazy;

use super::iupac::{iupac_mask, expand_base, gc_weight};
use super::types::ThermoParams;

/// Gas constant, cal/(K·mol)
const R: f64 = 1.987;

/// (ΔH kcal/mol, ΔS cal/(K·mol))
type Nn = (f64, f64);

/// Nearest-neighbour stacks indexed by [5' base][3' base], A=0 C=1 G=2 T=3.
static NN_TABLE: Lazy<[[Nn; 4]; 4]> = Lazy::new(|| {
    let mut t = [[(0.0, 0.0); 4]; 4];
    let stacks: [(&[u8; 2], &[u8; 2], Nn); 10] = [
        (b"AA", b"TT", (-7.9, -22.2)),
        (b"AT", b"AT", (-7.2, -20.4)),
        (b"TA", b"TA", (-7.2, -21.3)),
        (b"CA", b"TG", (-8.5, -22.7)),
        (b"GT", b"AC", (-8.4, -22.4)),
        (b"CT", b"AG", (-7.8, -21.0)),
        (b"GA", b"TC", (-8.2, -22.2)),
        (b"CG", b"CG", (-10.6, -27.2)),
        (b"GC", b"GC", (-9.8, -24.4)),
        (b"GG", b"CC", (-8.0, -19.9)),
    ];
    for (a, b, params) in stacks {
        t[index(a[0])][index(a[1])] = params;
        t[index(b[0])][index(b[1])] = params;
    }
    t
});

fn index(b: u8) -> usize {
    match b {
        b'A' => 0,
        b'C' => 1,
        b'G' => 2,
        _ => 3,
    }
}

/// Mean of `f` over every concrete base a symbol may stand for
fn mean_over<F: Fn(u8) -> Nn>(b: u8, f: F) -> Nn {
    let mut n = 0.0;
    let (mut dh, mut ds) = (0.0, 0.0);
    for base in expand_base(b) {
        let (h, s) = f(base);
        dh += h;
        ds += s;
        n += 1.0;
    }
    if n == 0.0 {
        return (0.0, 0.0);
    }
    (dh / n, ds / n)
}

fn terminal(b: u8) -> Nn {
    mean_over(b, |base| match base {
        b'G' | b'C' => (0.1, -2.8),
        _ => (2.3, 4.1),
    })
}

fn stack(a: u8, b: u8) -> Nn {
    mean_over(a, |x| mean_over(b, |y| NN_TABLE[index(x)][index(y)]))
}

/// Summed ΔH (kcal/mol) and ΔS (cal/(K·mol)) before salt correction
pub(crate) fn nn_sums(seq: &[u8]) -> Nn {
    let (Some(&first), Some(&last)) = (seq.first(), seq.last()) else {
        return (0.0, 0.0);
    };
    let (h0, s0) = terminal(first);
    let (h1, s1) = terminal(last);
    let (mut dh, mut ds) = (h0 + h1, s0 + s1);
    for pair in seq.windows(2) {
        let (h, s) = stack(pair[0], pair[1]);
        dh += h;
        ds += s;
    }
    (dh, ds)
}

/// Sodium-equivalent concentration in mol/L
fn sodium_equivalent(params: &ThermoParams) -> f64 {
    let free_mg = (params.dv_conc - params.dntp_conc).max(0.0);
    (params.mv_conc + 120.0 * free_mg.sqrt()) / 1000.0
}

/// Melting temperature in °C. Returns 0 for sequences without a valid base.
pub fn calc_tm(seq: &[u8], params: &ThermoParams) -> f64 {
    if seq.iter().all(|&b| iupac_mask(b) == 0) {
        return 0.0;
    }
    let (dh, mut ds) = nn_sums(seq);
    let na = sodium_equivalent(params);
    if na > 0.0 {
        ds += 0.368 * (seq.len() as f64 - 1.0) * na.ln();
    }
    let ct = params.dna_conc * 1e-9;
    (dh * 1000.0) / (ds + R * (ct / 4.0).ln()) - 273.15
}

/// GC fraction with degenerate symbols weighted one half
pub fn gc_fraction(seq: &[u8]) -> f64 {
    if seq.is_empty() {
        return 0.0;
    }
    seq.iter().map(|&b| gc_weight(b)).sum::<f64>() / seq.len() as f64
}

/// Length of the longest run of one repeated symbol
pub fn max_homopolymer(seq: &[u8]) -> usize {
    let mut best = 0;
    let mut run = 0;
    let mut prev = None;
    for &b in seq {
        if Some(b) == prev {
            run += 1;
        } else {
            run = 1;
            prev = Some(b);
        }
        best = best.max(run);
    }
    best
}
