//! Operaciones de bit sobre bitmaps direccionados por byte.
//!
//! Bit `n` vive en el byte `n / 8`, posición `n % 8` (bit 0 = LSB). La misma
//! convención sirve para el bitmap de bloques y para el de inodos.

/// Extensión de `[u8]` para leer y modificar bits individuales.
pub trait BitmapOps {
    /// Devuelve `false` si `bit` está fuera del bitmap.
    fn get_bit(&self, bit: usize) -> bool;

    /// No hace nada si `bit` está fuera del bitmap.
    fn set_bit(&mut self, bit: usize);

    fn clear_bit(&mut self, bit: usize);
}

impl BitmapOps for [u8] {
    #[inline]
    fn get_bit(&self, bit: usize) -> bool {
        self.get(bit / 8)
            .is_some_and(|b| b & (1 << (bit % 8)) != 0)
    }

    #[inline]
    fn set_bit(&mut self, bit: usize) {
        if let Some(byte) = self.get_mut(bit / 8) {
            *byte |= 1 << (bit % 8);
        }
    }

    #[inline]
    fn clear_bit(&mut self, bit: usize) {
        if let Some(byte) = self.get_mut(bit / 8) {
            *byte &= !(1 << (bit % 8));
        }
    }
}

/// Copia de trabajo de un bitmap. Nace igual al original y se van
/// limpiando bits a medida que el chequeo "reclama" bloques o inodos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowBitmap {
    bits: Vec<u8>,
}

impl ShadowBitmap {
    pub fn from_authoritative(bits: &[u8]) -> Self {
        Self {
            bits: bits.to_vec(),
        }
    }

    pub fn get(&self, bit: u32) -> bool {
        self.bits.get_bit(bit as usize)
    }

    pub fn clear(&mut self, bit: u32) {
        self.bits.clear_bit(bit as usize);
    }

    /// Limpia el bit si estaba puesto. Devuelve `false` si ya estaba limpio.
    pub fn claim(&mut self, bit: u32) -> bool {
        if self.get(bit) {
            self.clear(bit);
            true
        } else {
            false
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_clear() {
        let mut bitmap = [0u8; 4];

        bitmap.set_bit(0);
        bitmap.set_bit(7);
        assert_eq!(bitmap[0], 0b1000_0001);

        bitmap.set_bit(8);
        assert!(bitmap.get_bit(8));
        assert_eq!(bitmap[1], 0b0000_0001);

        bitmap.clear_bit(0);
        assert!(!bitmap.get_bit(0));
        assert_eq!(bitmap[0], 0b1000_0000);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut bitmap = [0u8; 2];
        bitmap.set_bit(100);
        bitmap.clear_bit(100);
        assert_eq!(bitmap, [0, 0]);
        assert!(!bitmap.get_bit(100));
    }

    #[test]
    fn test_shadow_claim_once() {
        let disk = [0b0000_0100u8, 0];
        let mut shadow = ShadowBitmap::from_authoritative(&disk);

        assert!(shadow.claim(2));
        assert!(!shadow.claim(2));
        assert!(!shadow.claim(3));
        // El original no se toca.
        assert!(disk.get_bit(2));
        assert_eq!(shadow.as_bytes(), &[0, 0]);
    }
}
