//! Legacy X11 keysym to UCS-4 (Unicode) table.
//!
//! Keysyms outside Latin-1 predate Unicode: Polish `ł` is `0x01B3`, Russian
//! `а` is `0x06C1`, and so on.  Modern servers also emit "Unicode keysyms"
//! of the form `0x0100_0000 | code_point`.  Both are folded into a single
//! code point here.
//!
//! Alphabetic blocks whose keysym order matches Unicode order (Greek,
//! Hebrew, currency) are computed; irregular blocks use sorted tables.

use super::linux_x11::KeySym;

/// Returned when a keysym has no Unicode equivalent.
pub const UCS4_INVALID: u32 = 0x0000_FFFF;

const UNICODE_KEYSYM_BASE: KeySym = 0x0100_0000;
const UNICODE_KEYSYM_FIRST: KeySym = 0x0100_0100;
const UNICODE_KEYSYM_LAST: KeySym = 0x0110_FFFF;

/// Latin-2, Latin-3 and publishing keysyms, sorted by keysym.
static IRREGULAR: &[(KeySym, u32)] = &[
    // Latin-2
    (0x01A1, 0x0104), // Aogonek
    (0x01A2, 0x02D8), // breve
    (0x01A3, 0x0141), // Lstroke
    (0x01A5, 0x013D), // Lcaron
    (0x01A6, 0x015A), // Sacute
    (0x01A9, 0x0160), // Scaron
    (0x01AA, 0x015E), // Scedilla
    (0x01AB, 0x0164), // Tcaron
    (0x01AC, 0x0179), // Zacute
    (0x01AE, 0x017D), // Zcaron
    (0x01AF, 0x017B), // Zabovedot
    (0x01B1, 0x0105), // aogonek
    (0x01B2, 0x02DB), // ogonek
    (0x01B3, 0x0142), // lstroke
    (0x01B5, 0x013E), // lcaron
    (0x01B6, 0x015B), // sacute
    (0x01B7, 0x02C7), // caron
    (0x01B9, 0x0161), // scaron
    (0x01BA, 0x015F), // scedilla
    (0x01BB, 0x0165), // tcaron
    (0x01BC, 0x017A), // zacute
    (0x01BD, 0x02DD), // doubleacute
    (0x01BE, 0x017E), // zcaron
    (0x01BF, 0x017C), // zabovedot
    (0x01C0, 0x0154), // Racute
    (0x01C3, 0x0102), // Abreve
    (0x01C5, 0x0139), // Lacute
    (0x01C6, 0x0106), // Cacute
    (0x01C8, 0x010C), // Ccaron
    (0x01CA, 0x0118), // Eogonek
    (0x01CC, 0x011A), // Ecaron
    (0x01CF, 0x010E), // Dcaron
    (0x01D0, 0x0110), // Dstroke
    (0x01D1, 0x0143), // Nacute
    (0x01D2, 0x0147), // Ncaron
    (0x01D5, 0x0150), // Odoubleacute
    (0x01D8, 0x0158), // Rcaron
    (0x01D9, 0x016E), // Uring
    (0x01DB, 0x0170), // Udoubleacute
    (0x01DE, 0x0162), // Tcedilla
    (0x01E0, 0x0155), // racute
    (0x01E3, 0x0103), // abreve
    (0x01E5, 0x013A), // lacute
    (0x01E6, 0x0107), // cacute
    (0x01E8, 0x010D), // ccaron
    (0x01EA, 0x0119), // eogonek
    (0x01EC, 0x011B), // ecaron
    (0x01EF, 0x010F), // dcaron
    (0x01F0, 0x0111), // dstroke
    (0x01F1, 0x0144), // nacute
    (0x01F2, 0x0148), // ncaron
    (0x01F5, 0x0151), // odoubleacute
    (0x01F8, 0x0159), // rcaron
    (0x01F9, 0x016F), // uring
    (0x01FB, 0x0171), // udoubleacute
    (0x01FE, 0x0163), // tcedilla
    (0x01FF, 0x02D9), // abovedot
    // Latin-3
    (0x02A1, 0x0126), // Hstroke
    (0x02A6, 0x0124), // Hcircumflex
    (0x02A9, 0x0130), // Iabovedot
    (0x02AB, 0x011E), // Gbreve
    (0x02AC, 0x0134), // Jcircumflex
    (0x02B1, 0x0127), // hstroke
    (0x02B6, 0x0125), // hcircumflex
    (0x02B9, 0x0131), // idotless
    (0x02BB, 0x011F), // gbreve
    (0x02BC, 0x0135), // jcircumflex
    (0x02C5, 0x010A), // Cabovedot
    (0x02C6, 0x0108), // Ccircumflex
    (0x02D5, 0x0120), // Gabovedot
    (0x02D8, 0x011C), // Gcircumflex
    (0x02DD, 0x016C), // Ubreve
    (0x02DE, 0x015C), // Scircumflex
    (0x02E5, 0x010B), // cabovedot
    (0x02E6, 0x0109), // ccircumflex
    (0x02F5, 0x0121), // gabovedot
    (0x02F8, 0x011D), // gcircumflex
    (0x02FD, 0x016D), // ubreve
    (0x02FE, 0x015D), // scircumflex
    // Cyrillic io
    (0x06A3, 0x0451), // Cyrillic_io
    (0x06B3, 0x0401), // Cyrillic_IO
    // Publishing
    (0x0AA1, 0x2003), // emspace
    (0x0AA2, 0x2002), // enspace
    (0x0AA9, 0x2014), // emdash
    (0x0AAA, 0x2013), // endash
    (0x0AAE, 0x2026), // ellipsis
    (0x0AC9, 0x2122), // trademark
    (0x0AD0, 0x2018), // leftsinglequotemark
    (0x0AD1, 0x2019), // rightsinglequotemark
    (0x0AD2, 0x201C), // leftdoublequotemark
    (0x0AD3, 0x201D), // rightdoublequotemark
];

/// Lowercase Cyrillic letters in keysym order `0x06C0..=0x06DF`.  The
/// uppercase block `0x06E0..=0x06FF` uses the same order.
static CYRILLIC_LOWER: [u32; 32] = [
    0x044E, 0x0430, 0x0431, 0x0446, 0x0434, 0x0435, 0x0444, 0x0433, // ю а б ц д е ф г
    0x0445, 0x0438, 0x0439, 0x043A, 0x043B, 0x043C, 0x043D, 0x043E, // х и й к л м н о
    0x043F, 0x044F, 0x0440, 0x0441, 0x0442, 0x0443, 0x0436, 0x0432, // п я р с т у ж в
    0x044C, 0x044B, 0x0437, 0x0448, 0x044D, 0x0449, 0x0447, 0x044A, // ь ы з ш э щ ч ъ
];

/// Translates an X11 keysym to a Unicode code point.
///
/// Returns [`UCS4_INVALID`] when the keysym is not in the table.
pub fn keysym_to_ucs4(keysym: KeySym) -> u32 {
    if (UNICODE_KEYSYM_FIRST..=UNICODE_KEYSYM_LAST).contains(&keysym) {
        return keysym - UNICODE_KEYSYM_BASE;
    }

    match keysym {
        // Cyrillic
        0x06C0..=0x06DF => CYRILLIC_LOWER[(keysym - 0x06C0) as usize],
        0x06E0..=0x06FF => CYRILLIC_LOWER[(keysym - 0x06E0) as usize] - 0x20,

        // Greek capitals, with the gap where final sigma would be
        0x07C1..=0x07D1 => 0x0391 + (keysym - 0x07C1),
        0x07D2 => 0x03A3,
        0x07D4..=0x07D9 => 0x03A4 + (keysym - 0x07D4),

        // Greek small letters
        0x07E1..=0x07F1 => 0x03B1 + (keysym - 0x07E1),
        0x07F2 => 0x03C3,
        0x07F3 => 0x03C2,
        0x07F4..=0x07F9 => 0x03C4 + (keysym - 0x07F4),

        // Hebrew aleph..taw
        0x0CE0..=0x0CFA => 0x05D0 + (keysym - 0x0CE0),

        // Currency symbols (EcuSign..EuroSign)
        0x20A0..=0x20AC => keysym,

        _ => IRREGULAR
            .binary_search_by_key(&keysym, |&(sym, _)| sym)
            .map(|index| IRREGULAR[index].1)
            .unwrap_or(UCS4_INVALID),
    }
}
