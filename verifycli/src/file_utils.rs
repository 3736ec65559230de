//! Contains utility functions related to reading certificates and CRLs from the filesystem

use std::error;
use std::fs;
use std::path::Path;

use log::{debug, error};

use x509verify::{parse_cert, parse_crl, PDVCertificate, PDVCrl};

pub(crate) type Result<T> = std::result::Result<T, Box<dyn error::Error>>;

const PEM_BEGIN: &str = "-----BEGIN ";
const PEM_END: &str = "-----END ";

/// `get_file_as_byte_vec` takes a Path containing a file name and returns a vector of bytes
/// containing the contents of that file.
pub(crate) fn get_file_as_byte_vec(filename: &Path) -> Result<Vec<u8>> {
    Ok(fs::read(filename)?)
}

/// `pem_blocks` returns the label and decoded contents of each PEM block in `text`, in order.
/// Text outside of the encapsulation boundaries is ignored.
pub(crate) fn pem_blocks(text: &str) -> Result<Vec<(String, Vec<u8>)>> {
    let mut blocks = vec![];
    let mut rest = text;
    while let Some(start) = rest.find(PEM_BEGIN) {
        let block = &rest[start..];
        let end_marker = block.find(PEM_END).ok_or("PEM block is missing its end boundary")?;
        let after_end = &block[end_marker + PEM_END.len()..];
        let close = after_end
            .find("-----")
            .ok_or("PEM block end boundary is malformed")?;
        let len = end_marker + PEM_END.len() + close + "-----".len();
        let (label, der) = pem_rfc7468::decode_vec(block[..len].as_bytes())?;
        blocks.push((label.to_string(), der));
        rest = &block[len..];
    }
    Ok(blocks)
}

/// `der_objects` reads a file and returns the DER encoded objects it holds with the given PEM
/// label. Files that do not contain a PEM boundary are treated as a single DER object.
fn der_objects(filename: &str, label: &str) -> Result<Vec<Vec<u8>>> {
    let bytes = get_file_as_byte_vec(Path::new(filename))?;
    let is_pem = std::str::from_utf8(&bytes)
        .map(|text| text.contains(PEM_BEGIN))
        .unwrap_or(false);
    if !is_pem {
        return Ok(vec![bytes]);
    }
    let text = std::str::from_utf8(&bytes)?;

    let mut objects = vec![];
    for (found, der) in pem_blocks(text)? {
        if found == label {
            objects.push(der);
        } else {
            debug!("Skipping {} PEM block in {}", found, filename);
        }
    }
    if objects.is_empty() {
        error!("No {} PEM blocks found in {}", label, filename);
        return Err(format!("no {} found in {}", label, filename).into());
    }
    Ok(objects)
}

/// `load_certs` returns every certificate contained in the named DER or PEM file
pub(crate) fn load_certs(filename: &str) -> Result<Vec<PDVCertificate>> {
    let mut certs = vec![];
    for der in der_objects(filename, "CERTIFICATE")? {
        match parse_cert(&der, filename) {
            Ok(cert) => certs.push(cert),
            Err(e) => {
                error!("Failed to parse certificate from {}: {:?}", filename, e);
                return Err(format!("unable to load certificate from {}: {}", filename, e).into());
            }
        }
    }
    debug!("Read {} certificate(s) from {}", certs.len(), filename);
    Ok(certs)
}

/// `load_crls` returns every CRL contained in the named DER or PEM file
pub(crate) fn load_crls(filename: &str) -> Result<Vec<PDVCrl>> {
    let mut crls = vec![];
    for der in der_objects(filename, "X509 CRL")? {
        match parse_crl(&der, filename) {
            Ok(crl) => crls.push(crl),
            Err(e) => {
                error!("Failed to parse CRL from {}: {:?}", filename, e);
                return Err(format!("unable to load CRL from {}: {}", filename, e).into());
            }
        }
    }
    debug!("Read {} CRL(s) from {}", crls.len(), filename);
    Ok(crls)
}

/// `load_all_certs` concatenates the certificates from each named file
pub(crate) fn load_all_certs(filenames: &[String]) -> Result<Vec<PDVCertificate>> {
    let mut certs = vec![];
    for f in filenames {
        certs.extend(load_certs(f)?);
    }
    Ok(certs)
}

#[test]
fn pem_block_splitting() {
    let text = "junk before\n-----BEGIN CERTIFICATE-----\nAAEC\n-----END CERTIFICATE-----\n\
                between\n-----BEGIN X509 CRL-----\nAwQ=\n-----END X509 CRL-----\n";
    let blocks = pem_blocks(text).unwrap();
    assert_eq!(2, blocks.len());
    assert_eq!(("CERTIFICATE".to_string(), vec![0, 1, 2]), blocks[0]);
    assert_eq!(("X509 CRL".to_string(), vec![3, 4]), blocks[1]);

    assert!(pem_blocks("-----BEGIN CERTIFICATE-----\nAAEC\n").is_err());
    assert!(pem_blocks("no pem here").unwrap().is_empty());
}
