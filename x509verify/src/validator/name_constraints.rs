//! Name constraints enforcement
//!
//! Each CA in a chain that carries a nameConstraints extension constrains the names of every
//! certificate below it. The subject DN, emailAddress attributes in the subject DN and the
//! directoryName, rfc822Name, dNSName, uniformResourceIdentifier and iPAddress entries of the
//! subjectAltName extension are checked. Other name forms are not constrained.

use const_oid::db::rfc3280::EMAIL_ADDRESS;
use der::Tagged;
use log::{debug, info};
use x509_cert::ext::pkix::constraints::name::{GeneralSubtree, GeneralSubtrees};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::NameConstraints;
use x509_cert::name::{Name, RelativeDistinguishedName};

use crate::{
    util::error::*, util::pdv_utilities::*, validator::pdv_certificate::PDVCertificate,
};

/// Name harvested from a certificate for comparison against name constraints
#[derive(Clone, Debug)]
enum CandidateName<'a> {
    Dn(&'a Name),
    Rfc822(String),
    Dns(&'a str),
    Uri(&'a str),
    Ip(&'a [u8]),
}

impl<'a> CandidateName<'a> {
    fn same_form(&self, base: &GeneralName) -> bool {
        matches!(
            (self, base),
            (CandidateName::Dn(_), GeneralName::DirectoryName(_))
                | (CandidateName::Rfc822(_), GeneralName::Rfc822Name(_))
                | (CandidateName::Dns(_), GeneralName::DnsName(_))
                | (CandidateName::Uri(_), GeneralName::UniformResourceIdentifier(_))
                | (CandidateName::Ip(_), GeneralName::IpAddress(_))
        )
    }

    fn within(&self, subtree: &GeneralSubtree) -> bool {
        match (self, &subtree.base) {
            (CandidateName::Dn(name), GeneralName::DirectoryName(base)) => {
                descended_from_dn(base, name, subtree.minimum, subtree.maximum)
            }
            (CandidateName::Rfc822(addr), GeneralName::Rfc822Name(base)) => {
                descended_from_rfc822(base.as_str(), addr)
            }
            (CandidateName::Dns(host), GeneralName::DnsName(base)) => {
                descended_from_host(base.as_str(), host)
            }
            (CandidateName::Uri(uri), GeneralName::UniformResourceIdentifier(base)) => {
                match uri_host(uri) {
                    Some(host) => descended_from_uri_host(base.as_str(), &host),
                    None => false,
                }
            }
            (CandidateName::Ip(addr), GeneralName::IpAddress(base)) => {
                within_ip_range(base.as_bytes(), addr)
            }
            _ => false,
        }
    }
}

fn rdn_matches(base: &RelativeDistinguishedName, cand: &RelativeDistinguishedName) -> bool {
    if base == cand {
        return true;
    }
    if base.0.len() != cand.0.len() {
        return false;
    }
    // Tolerate a different string type on an attribute value if the content is identical
    base.0.iter().zip(cand.0.iter()).all(|(l, r)| {
        let same = l.oid == r.oid && l.value.value() == r.value.value();
        if same && l.value.tag() != r.value.tag() {
            debug!("Permitting a DN name constraint match despite different character sets");
        }
        same
    })
}

/// `descended_from_dn` returns true if `name` is equal to or subordinate to `subtree`, with the
/// number of additional RDNs between `min` and `max`.
pub(crate) fn descended_from_dn(subtree: &Name, name: &Name, min: u32, max: Option<u32>) -> bool {
    if subtree.0.len() > name.0.len() {
        return false;
    }
    let diff = (name.0.len() - subtree.0.len()) as u32;
    if diff < min {
        return false;
    }
    if let Some(max) = max {
        if diff > max {
            return false;
        }
    }
    subtree
        .0
        .iter()
        .zip(name.0.iter())
        .all(|(l, r)| rdn_matches(l, r))
}

/// `descended_from_host` returns true if `cand` equals `base` or is a subdomain of it. A base
/// beginning with a period only matches subdomains. An empty base matches any host.
pub(crate) fn descended_from_host(base: &str, cand: &str) -> bool {
    if base.is_empty() {
        return true;
    }
    let base = base.to_ascii_lowercase();
    let cand = cand.to_ascii_lowercase();
    if let Some(stripped) = base.strip_prefix('.') {
        return cand.len() > stripped.len() && cand.ends_with(base.as_str());
    }
    if cand == base {
        return true;
    }
    cand.len() > base.len()
        && cand.ends_with(base.as_str())
        && cand.as_bytes()[cand.len() - base.len() - 1] == b'.'
}

/// `descended_from_uri_host` compares the host portion of a URI to a URI name constraint, which
/// names a host exactly or, when beginning with a period, any host within a domain.
pub(crate) fn descended_from_uri_host(base: &str, host: &str) -> bool {
    if base.starts_with('.') {
        host.len() > base.len() && host.to_ascii_lowercase().ends_with(&base.to_ascii_lowercase())
    } else {
        host.eq_ignore_ascii_case(base)
    }
}

/// `descended_from_rfc822` compares a mailbox to an rfc822Name constraint. The constraint may
/// name a mailbox, a host (all mailboxes on that host) or, when beginning with a period, a domain
/// (all mailboxes on hosts within the domain).
pub(crate) fn descended_from_rfc822(base: &str, addr: &str) -> bool {
    let (local, host) = match addr.rsplit_once('@') {
        Some(parts) => parts,
        None => return false,
    };
    if let Some((base_local, base_host)) = base.rsplit_once('@') {
        return base_local == local && base_host.eq_ignore_ascii_case(host);
    }
    if base.starts_with('.') {
        return host.len() > base.len()
            && host.to_ascii_lowercase().ends_with(&base.to_ascii_lowercase());
    }
    host.eq_ignore_ascii_case(base)
}

/// `within_ip_range` returns true if `addr` falls in the address range expressed by `base`, an
/// address followed by a mask of the same length.
pub(crate) fn within_ip_range(base: &[u8], addr: &[u8]) -> bool {
    if base.len() != addr.len() * 2 {
        return false;
    }
    let (net, mask) = base.split_at(addr.len());
    net.iter()
        .zip(mask.iter())
        .zip(addr.iter())
        .all(|((n, m), a)| n & m == a & m)
}

fn uri_host(uri: &str) -> Option<String> {
    let url = url::Url::parse(uri).ok()?;
    url.host_str().map(|h| h.to_string())
}

fn collect_names(cert: &PDVCertificate) -> Vec<CandidateName<'_>> {
    let mut names = vec![];
    let subject = cert.subject();
    if !subject.0.is_empty() {
        names.push(CandidateName::Dn(subject));
        for rdn in &subject.0 {
            for atav in rdn.0.iter() {
                if EMAIL_ADDRESS == atav.oid {
                    if let Ok(addr) = core::str::from_utf8(atav.value.value()) {
                        names.push(CandidateName::Rfc822(addr.to_string()));
                    }
                }
            }
        }
    }
    if let Some(san) = cert.subject_alt_name() {
        for gn in &san.0 {
            match gn {
                GeneralName::DirectoryName(dn) => names.push(CandidateName::Dn(dn)),
                GeneralName::Rfc822Name(addr) => {
                    names.push(CandidateName::Rfc822(addr.to_string()))
                }
                GeneralName::DnsName(host) => names.push(CandidateName::Dns(host.as_str())),
                GeneralName::UniformResourceIdentifier(uri) => {
                    names.push(CandidateName::Uri(uri.as_str()))
                }
                GeneralName::IpAddress(ip) => names.push(CandidateName::Ip(ip.as_bytes())),
                _ => {}
            }
        }
    }
    names
}

fn permitted(subtrees: &Option<GeneralSubtrees>, name: &CandidateName<'_>) -> bool {
    let subtrees = match subtrees {
        Some(subtrees) => subtrees,
        None => return true,
    };
    let mut same_form = subtrees.iter().filter(|s| name.same_form(&s.base)).peekable();
    if same_form.peek().is_none() {
        return true;
    }
    same_form.any(|s| name.within(s))
}

fn excluded(subtrees: &Option<GeneralSubtrees>, name: &CandidateName<'_>) -> bool {
    match subtrees {
        Some(subtrees) => subtrees
            .iter()
            .any(|s| name.same_form(&s.base) && name.within(s)),
        None => false,
    }
}

/// `names_within_constraints` returns true if every name in `cert` falls in a permitted subtree of
/// its form (when `nc` lists any of that form) and in no excluded subtree.
pub fn names_within_constraints(cert: &PDVCertificate, nc: &NameConstraints) -> bool {
    collect_names(cert).iter().all(|name| {
        let ok = permitted(&nc.permitted_subtrees, name) && !excluded(&nc.excluded_subtrees, name);
        if !ok {
            debug!("Name constraint violation: {:?}", name);
        }
        ok
    })
}

/// `check_name_constraints` checks the certificate at index `i` of `chain` (leaf first) against
/// the nameConstraints of every certificate above it. Self-issued certificates other than the leaf
/// are not checked.
pub fn check_name_constraints(chain: &[&PDVCertificate], i: usize) -> Result<()> {
    let cert = match chain.get(i) {
        Some(cert) => cert,
        None => return Ok(()),
    };
    if i > 0 && is_self_issued(&cert.decoded_cert) {
        return Ok(());
    }
    for ca in chain.iter().skip(i + 1) {
        if let Some(nc) = ca.name_constraints() {
            if !names_within_constraints(cert, nc) {
                info!(
                    "Certificate issued to {} violates name constraints from {}",
                    name_to_string(cert.subject()),
                    name_to_string(ca.subject())
                );
                return Err(Error::PathValidation(
                    PathValidationStatus::NameConstraintsViolation,
                ));
            }
        }
    }
    Ok(())
}
