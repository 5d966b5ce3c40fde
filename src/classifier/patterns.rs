//! Fixed statement shapes and the composite master-name template.

use lazy_static::*;
use regex::Regex;

use crate::error::Result;

lazy_static! {
    pub static ref PARAMETERS: Regex = Regex::new(r"^\s*parameters(\s|$)").unwrap();
    pub static ref GLOBAL: Regex = Regex::new(r"^\s*global\s+\S").unwrap();
    pub static ref MODEL: Regex = Regex::new(r"^\s*model\s+\S+\s+\S+").unwrap();
    pub static ref ANALOG_MODEL: Regex =
        Regex::new(r"\sanalogmodel\s+modelname\s*=\s*(?P<master>[^\s)]+)").unwrap();
    pub static ref SUBCKT: Regex =
        Regex::new(r"^\s*(?P<inline>inline\s+)?subckt\s+(?P<name>[^\s(]+)").unwrap();
    pub static ref USER_FUNCTION: Regex =
        Regex::new(r"^\s*(?P<ty>real)\s+(?P<name>\w+)\s*\((?P<args>[^)]*)\)").unwrap();
    pub static ref LIBRARY: Regex = Regex::new(r"^\s*library\s+(?P<name>\S+)").unwrap();
    pub static ref SECTION: Regex = Regex::new(r"^\s*section\s+(?P<name>\S+)").unwrap();
    pub static ref CONDITIONAL: Regex = Regex::new(r"^\s*(if\s*\(|else\b)").unwrap();
    pub static ref INCLUDE: Regex = Regex::new(r"^\s*(?P<ahdl>ahdl_)?include\s").unwrap();
    pub static ref PARAM_TEST: Regex = Regex::new(r"^\s*\S+\s+paramtest(\s|$)").unwrap();
    pub static ref SIMULATOR_LANG: Regex =
        Regex::new(r"^\s*simulator\s+lang\s*=\s*(?P<lang>\w+)").unwrap();
}

/// `name [(nodes) | nodes] master [params]` for any master in `names`.
///
/// The master is the last token before the first `name=value` parameter, so
/// a bare node named like a master is still a node.
///
/// Returns `None` for an empty vocabulary, which must never match.
pub fn composite<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Option<Regex>> {
    let Some(alternation) = alternation(names) else {
        return Ok(None);
    };
    let pattern = format!(
        r"^\s*(?P<name>[^\s(){{}}=]+)\s*(?:\((?P<nodes>[^)]*)\)\s*|(?P<bare>(?:[^\s(){{}}=]+\s+)*))(?P<master>{})(?:\s+(?P<params>[^\s=]+\s*=.*?))?\s*$",
        alternation
    );
    Ok(Some(Regex::new(&pattern)?))
}

/// `master [args]` for any master in `names`.
pub fn leading<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Option<Regex>> {
    let Some(alternation) = alternation(names) else {
        return Ok(None);
    };
    let pattern = format!(r"^\s*(?P<master>{})(?:\s+(?P<args>.*?))?\s*$", alternation);
    Ok(Some(Regex::new(&pattern)?))
}

fn alternation<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut escaped: Vec<String> = names.into_iter().map(regex::escape).collect();
    if escaped.is_empty() {
        return None;
    }
    escaped.sort();
    Some(escaped.join("|"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_accepts_both_node_forms() {
        let re = composite(["resistor", "capacitor"]).unwrap().unwrap();

        let caps = re.captures("r1 (a b) resistor r=1k").unwrap();
        assert_eq!(&caps["name"], "r1");
        assert_eq!(&caps["nodes"], "a b");
        assert_eq!(&caps["master"], "resistor");
        assert_eq!(&caps["params"], "r=1k");

        let caps = re.captures("c1 out 0 capacitor c=1p").unwrap();
        assert_eq!(caps["bare"].trim(), "out 0");
        assert_eq!(&caps["master"], "capacitor");

        assert!(re.captures("x1 (a b) inverter").is_none());
    }

    #[test]
    fn master_must_be_a_whole_token() {
        let re = composite(["tran"]).unwrap().unwrap();
        assert!(re.is_match("tran1 tran stop=1u"));
        assert!(!re.is_match("x1 a b transient"));
    }

    #[test]
    fn bare_node_named_like_a_master() {
        let re = composite(["tran"]).unwrap().unwrap();
        assert!(!re.is_match("r1 tran 0 resistor r=1k"));

        let re = composite(["resistor", "tran"]).unwrap().unwrap();
        let caps = re.captures("r1 tran 0 resistor r=1k").unwrap();
        assert_eq!(caps["bare"].trim(), "tran 0");
        assert_eq!(&caps["master"], "resistor");
    }

    #[test]
    fn empty_vocabulary_never_matches() {
        assert!(composite(std::iter::empty()).unwrap().is_none());
        assert!(leading(std::iter::empty()).unwrap().is_none());
    }

    #[test]
    fn names_are_escaped() {
        let re = leading(["a.b"]).unwrap().unwrap();
        assert!(re.is_match("a.b x y"));
        assert!(!re.is_match("axb x y"));
    }
}
