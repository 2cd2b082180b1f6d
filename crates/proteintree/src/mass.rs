/// Standard amino acid residues, including selenocysteine and pyrrolysine
pub const VALID_AA: [u8; 22] = [
    b'A', b'C', b'D', b'E', b'F', b'G', b'H', b'I', b'K', b'L', b'M', b'N', b'P', b'Q', b'R', b'S',
    b'T', b'V', b'W', b'Y', b'U', b'O',
];

/// Single letter codes standing for more than one residue
pub const COMBINATION_AA: [u8; 4] = [b'B', b'J', b'Z', b'X'];

pub trait Mass {
    /// Monoisotopic residue mass in Da, `None` for combination codes and
    /// anything that is not an amino acid
    fn monoisotopic(&self) -> Option<f64>;
}

impl Mass for u8 {
    fn monoisotopic(&self) -> Option<f64> {
        let mass = match self {
            b'A' => 71.03711,
            b'R' => 156.1011,
            b'N' => 114.04293,
            b'D' => 115.02694,
            b'C' => 103.00919,
            b'E' => 129.04259,
            b'Q' => 128.05858,
            b'G' => 57.02146,
            b'H' => 137.05891,
            b'I' => 113.08406,
            b'L' => 113.08406,
            b'K' => 128.09496,
            b'M' => 131.0405,
            b'F' => 147.0684,
            b'P' => 97.05276,
            b'S' => 87.03203,
            b'T' => 101.04768,
            b'W' => 186.07931,
            b'Y' => 163.06333,
            b'V' => 99.06841,
            b'U' => 150.95363,
            b'O' => 237.14773,
            _ => return None,
        };
        Some(mass)
    }
}
