//! Distinguished name rendering driven by a set of option flags
//!
//! ```
//! use core::str::FromStr;
//! use x509_cert::name::Name;
//! use x509verify::*;
//!
//! let name = Name::from_str("CN=Leaf,O=Test,C=US").unwrap();
//! assert_eq!("C = US, O = Test, CN = Leaf", name_to_string_with_flags(&name, oneline()));
//! assert_eq!("CN=Leaf,O=Test,C=US", name_to_string_with_flags(&name, rfc2253()));
//! ```

use std::io::Write;

use der::{Tag, Tagged};
use flagset::{flags, FlagSet};
use log::error;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::Name;

use crate::util::{error::*, pdv_utilities::*};

flags! {
    /// Options that control how a distinguished name is rendered
    pub enum NameFlags: u32 {
        /// Escape characters that are special in RFC 2253 strings with a backslash
        EscRfc2253,
        /// Escape control characters as \XX
        EscCtrl,
        /// Escape characters with the most significant bit set as \XX per UTF-8 byte
        EscMsb,
        /// Surround values containing special characters with double quotes instead of escaping
        EscQuote,
        /// Separate RDNs with "," and multi-valued RDN components with "+"
        SepCommaPlus,
        /// Separate RDNs with ", " and multi-valued RDN components with " + "
        SepCommaPlusSpace,
        /// Separate RDNs with "; " and multi-valued RDN components with " + "
        SepSemiPlusSpace,
        /// One RDN per line
        SepMultiline,
        /// Render the most specific RDN first
        DnReverse,
        /// Use short attribute names, i.e., CN
        FieldShortName,
        /// Use long attribute names, i.e., commonName
        FieldLongName,
        /// Use dotted attribute type OIDs
        FieldOid,
        /// Pad attribute names to a fixed width
        FieldAlign,
        /// Put spaces around the equal sign
        SpaceEqual,
        /// Render values of unrecognized string types as # followed by the hex encoded DER
        DumpUnknownFields,
    }
}

/// Flags for RFC 2253 compatible output
pub fn rfc2253() -> FlagSet<NameFlags> {
    NameFlags::EscRfc2253
        | NameFlags::EscCtrl
        | NameFlags::EscMsb
        | NameFlags::SepCommaPlus
        | NameFlags::DnReverse
        | NameFlags::FieldShortName
        | NameFlags::DumpUnknownFields
}

/// Flags for single line output that is easier to read than RFC 2253
pub fn oneline() -> FlagSet<NameFlags> {
    NameFlags::EscRfc2253
        | NameFlags::EscCtrl
        | NameFlags::EscMsb
        | NameFlags::EscQuote
        | NameFlags::SepCommaPlusSpace
        | NameFlags::SpaceEqual
        | NameFlags::FieldShortName
}

/// Flags for multi-line output
pub fn multiline() -> FlagSet<NameFlags> {
    NameFlags::EscCtrl
        | NameFlags::EscMsb
        | NameFlags::SepMultiline
        | NameFlags::SpaceEqual
        | NameFlags::FieldLongName
        | NameFlags::FieldAlign
}

fn flags_for_option(option: &str) -> Option<FlagSet<NameFlags>> {
    let f = match option {
        "esc_2253" => NameFlags::EscRfc2253.into(),
        "esc_ctrl" => NameFlags::EscCtrl.into(),
        "esc_msb" => NameFlags::EscMsb.into(),
        "use_quote" => NameFlags::EscQuote.into(),
        "sep_comma_plus" => NameFlags::SepCommaPlus.into(),
        "sep_comma_plus_space" => NameFlags::SepCommaPlusSpace.into(),
        "sep_semi_plus_space" => NameFlags::SepSemiPlusSpace.into(),
        "sep_multiline" => NameFlags::SepMultiline.into(),
        "dn_rev" => NameFlags::DnReverse.into(),
        "sname" => NameFlags::FieldShortName.into(),
        "lname" => NameFlags::FieldLongName.into(),
        "oid" => NameFlags::FieldOid.into(),
        "align" => NameFlags::FieldAlign.into(),
        "space_eq" => NameFlags::SpaceEqual.into(),
        "dump_unknown" => NameFlags::DumpUnknownFields.into(),
        "rfc2253" => rfc2253(),
        "oneline" => oneline(),
        "multiline" => multiline(),
        _ => return None,
    };
    Some(f)
}

/// `parse_name_flags` resolves a comma separated list of option names into a set of flags. Options
/// are applied in order; a leading `-` removes the option's flags, i.e., "oneline,-esc_msb,dn_rev".
pub fn parse_name_flags(options: &str) -> Result<FlagSet<NameFlags>> {
    let mut flags = FlagSet::default();
    for option in options.split(',').map(str::trim).filter(|o| !o.is_empty()) {
        let (remove, name) = match option.strip_prefix('-') {
            Some(name) => (true, name),
            None => (false, option),
        };
        match flags_for_option(&name.to_lowercase()) {
            Some(f) if remove => flags -= f,
            Some(f) => flags |= f,
            None => {
                error!("Unrecognized name option: {}", option);
                return Err(Error::Unrecognized);
            }
        }
    }
    Ok(flags)
}

fn field_name(atav: &AttributeTypeAndValue, flags: FlagSet<NameFlags>) -> String {
    let dotted = atav.oid.to_string();
    let mut name = if flags.contains(NameFlags::FieldOid) {
        dotted
    } else if flags.contains(NameFlags::FieldLongName) {
        oid_long_name(&atav.oid).unwrap_or(dotted)
    } else {
        oid_lookup(&atav.oid).unwrap_or(dotted)
    };
    if flags.contains(NameFlags::FieldAlign) {
        let width = if flags.contains(NameFlags::FieldLongName) {
            25
        } else {
            10
        };
        while name.len() < width {
            name.push(' ');
        }
    }
    name
}

fn string_value(atav: &AttributeTypeAndValue) -> Option<String> {
    match atav.value.tag() {
        Tag::PrintableString | Tag::Utf8String | Tag::Ia5String | Tag::TeletexString => {
            core::str::from_utf8(atav.value.value())
                .ok()
                .map(|s| s.to_string())
        }
        Tag::BmpString => {
            let units: Vec<u16> = atav
                .value
                .value()
                .chunks(2)
                .map(|c| u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)]))
                .collect();
            String::from_utf16(&units).ok()
        }
        _ => None,
    }
}

fn needs_quotes(value: &str) -> bool {
    value.starts_with('#')
        || value.starts_with(' ')
        || value.ends_with(' ')
        || value
            .chars()
            .any(|c| matches!(c, ',' | '+' | '<' | '>' | ';'))
}

/// `escape_value` renders an attribute value per the escaping options in `flags`
pub fn escape_value(value: &str, flags: FlagSet<NameFlags>) -> String {
    let quote = flags.contains(NameFlags::EscQuote) && needs_quotes(value);
    let esc_2253 = flags.contains(NameFlags::EscRfc2253);
    let mut out = String::new();
    if quote {
        out.push('"');
    }
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        match c {
            '"' | '\\' if esc_2253 || quote => {
                out.push('\\');
                out.push(c);
            }
            ',' | '+' | '<' | '>' | ';' if esc_2253 && !quote => {
                out.push('\\');
                out.push(c);
            }
            '#' if 0 == i && esc_2253 && !quote => out.push_str("\\#"),
            ' ' if (0 == i || i == last) && esc_2253 && !quote => out.push_str("\\ "),
            '\x00'..='\x1f' | '\x7f' if flags.contains(NameFlags::EscCtrl) => {
                out.push_str(&format!("\\{:02X}", c as u8));
            }
            c if !c.is_ascii() && flags.contains(NameFlags::EscMsb) => {
                let mut buf = [0u8; 4];
                for b in c.encode_utf8(&mut buf).as_bytes() {
                    out.push_str(&format!("\\{:02X}", b));
                }
            }
            c => out.push(c),
        }
    }
    if quote {
        out.push('"');
    }
    out
}

fn render_atav(atav: &AttributeTypeAndValue, flags: FlagSet<NameFlags>) -> String {
    let eq = if flags.contains(NameFlags::SpaceEqual) {
        " = "
    } else {
        "="
    };
    let value = match string_value(atav) {
        Some(s) => escape_value(&s, flags),
        None if flags.contains(NameFlags::DumpUnknownFields) => {
            match der::Encode::to_der(&atav.value) {
                Ok(enc) => format!("#{}", buffer_to_hex(&enc)),
                Err(_) => String::from("<unencodable>"),
            }
        }
        None => escape_value(&String::from_utf8_lossy(atav.value.value()), flags),
    };
    format!("{}{}{}", field_name(atav, flags), eq, value)
}

fn separators(flags: FlagSet<NameFlags>) -> (&'static str, &'static str) {
    if flags.contains(NameFlags::SepMultiline) {
        ("\n", " + ")
    } else if flags.contains(NameFlags::SepSemiPlusSpace) {
        ("; ", " + ")
    } else if flags.contains(NameFlags::SepCommaPlus) {
        (",", "+")
    } else {
        (", ", " + ")
    }
}

/// `name_to_string_with_flags` renders `name` per `flags`. Without [`NameFlags::DnReverse`] RDNs
/// appear in encoded order, i.e., the most general RDN first.
pub fn name_to_string_with_flags(name: &Name, flags: FlagSet<NameFlags>) -> String {
    let (rdn_sep, atav_sep) = separators(flags);
    let rdns: Vec<String> = name
        .0
        .iter()
        .map(|rdn| {
            rdn.0
                .iter()
                .map(|atav| render_atav(atav, flags))
                .collect::<Vec<String>>()
                .join(atav_sep)
        })
        .collect();
    let ordered: Vec<String> = if flags.contains(NameFlags::DnReverse) {
        rdns.into_iter().rev().collect()
    } else {
        rdns
    };
    ordered.join(rdn_sep)
}

/// `print_name` writes `name` rendered per `flags` to `out`, indenting every line by `indent`
/// spaces. Write errors are ignored.
pub fn print_name(out: &mut dyn Write, name: &Name, flags: FlagSet<NameFlags>, indent: usize) {
    let pad = " ".repeat(indent);
    for line in name_to_string_with_flags(name, flags).split('\n') {
        let _ = writeln!(out, "{}{}", pad, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;

    #[test]
    fn option_parsing() {
        assert_eq!(oneline(), parse_name_flags("oneline").unwrap());
        let f = parse_name_flags("oneline,-esc_msb,dn_rev").unwrap();
        assert!(!f.contains(NameFlags::EscMsb));
        assert!(f.contains(NameFlags::DnReverse));
        assert!(f.contains(NameFlags::SepCommaPlusSpace));
        assert!(parse_name_flags("").unwrap().is_empty());
        assert_eq!(Err(Error::Unrecognized), parse_name_flags("oneline,bogus"));
    }

    #[test]
    fn escaping() {
        let f = FlagSet::from(NameFlags::EscRfc2253);
        assert_eq!("a\\,b", escape_value("a,b", f));
        assert_eq!("\\#x\\ ", escape_value("#x ", f));
        let q = NameFlags::EscRfc2253 | NameFlags::EscQuote;
        assert_eq!("\"a,b\"", escape_value("a,b", q));
        assert_eq!("plain", escape_value("plain", q));
        assert_eq!("tab\\09", escape_value("tab\t", FlagSet::from(NameFlags::EscCtrl)));
        assert_eq!("caf\\C3\\A9", escape_value("café", FlagSet::from(NameFlags::EscMsb)));
        assert_eq!("café", escape_value("café", FlagSet::default()));
    }

    #[test]
    fn render() {
        let name = Name::from_str("CN=Leaf,O=Test,C=US").unwrap();
        assert_eq!("C=US, O=Test, CN=Leaf", name_to_string_with_flags(&name, FlagSet::default()));
        assert_eq!(
            "CN = Leaf; O = Test; C = US",
            name_to_string_with_flags(
                &name,
                NameFlags::DnReverse | NameFlags::SepSemiPlusSpace | NameFlags::SpaceEqual
            )
        );
        assert_eq!(
            "2.5.4.6=US,2.5.4.10=Test,2.5.4.3=Leaf",
            name_to_string_with_flags(&name, NameFlags::FieldOid | NameFlags::SepCommaPlus)
        );

        let odd = Name::from_str("CN=Leaf,1.2.3.4=#04024142").unwrap();
        assert_eq!("CN=Leaf,1.2.3.4=#04024142", name_to_string_with_flags(&odd, rfc2253()));
        assert_eq!(
            "1.2.3.4=AB, CN=Leaf",
            name_to_string_with_flags(&odd, FlagSet::default())
        );

        let mut out = vec![];
        print_name(&mut out, &name, multiline(), 2);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(3, lines.len());
        assert!(lines[0].starts_with("  countryName"));
        assert!(lines[2].ends_with("= Leaf"));
    }
}
