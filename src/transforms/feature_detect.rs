//! Feature-detection script builder.
//!
//! Finds which browser feature tests the built stylesheet and scripts rely
//! on and emits a small script that runs only those tests, exposes the
//! results as `window.Modernizr`, and adds `feature` / `no-feature` classes
//! to the `<html>` element (replacing `no-js` with `js`).

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::expect_used)]
static CSS_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.(?:no-)?([a-z0-9]+)\b").expect("valid class regex"));

#[allow(clippy::expect_used)]
static DECLARATION_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^{}]*\}").expect("valid block regex"));

#[allow(clippy::expect_used)]
static JS_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bModernizr\.([A-Za-z0-9_]+)").expect("valid reference regex"));

/// Library methods and properties that are not feature tests.
const API_MEMBERS: &[&str] = &[
    "_config",
    "_domPrefixes",
    "_prefixes",
    "addTest",
    "atRule",
    "hasEvent",
    "mq",
    "on",
    "prefixed",
    "testAllProps",
    "testProp",
    "testStyles",
];

/// Known feature tests: name and a JavaScript expression evaluating to a
/// boolean. Expressions may use the `prop(name)` helper, which checks a
/// style property with and without vendor prefixes.
const CATALOG: &[(&str, &str)] = &[
    ("audio", "!!document.createElement('audio').canPlayType"),
    ("borderradius", "prop('borderRadius')"),
    ("boxshadow", "prop('boxShadow')"),
    ("boxsizing", "prop('boxSizing')"),
    ("canvas", "(function(){var c=document.createElement('canvas');return !!(c.getContext&&c.getContext('2d'))})()"),
    ("cssanimations", "prop('animationName')"),
    ("csscolumns", "prop('columnCount')"),
    ("csstransforms", "prop('transform')"),
    ("csstransforms3d", "prop('perspective')"),
    ("csstransitions", "prop('transition')"),
    ("flexbox", "prop('flexBasis')"),
    ("geolocation", "'geolocation' in navigator"),
    ("hashchange", "'onhashchange' in window"),
    ("history", "!!(window.history&&history.pushState)"),
    ("inlinesvg", "(function(){var d=document.createElement('div');d.innerHTML='<svg/>';return (d.firstChild&&d.firstChild.namespaceURI)=='http://www.w3.org/2000/svg'})()"),
    ("localstorage", "(function(){try{localStorage.setItem('m','m');localStorage.removeItem('m');return true}catch(e){return false}})()"),
    ("opacity", "prop('opacity')"),
    ("placeholder", "'placeholder' in document.createElement('input')"),
    ("rgba", "(function(){s.cssText='background-color:rgba(150,255,150,.5)';return (''+s.backgroundColor).indexOf('rgba')>-1})()"),
    ("sessionstorage", "(function(){try{sessionStorage.setItem('m','m');sessionStorage.removeItem('m');return true}catch(e){return false}})()"),
    ("svg", "!!document.createElementNS&&!!document.createElementNS('http://www.w3.org/2000/svg','svg').createSVGRect"),
    ("touchevents", "('ontouchstart' in window)||!!(window.DocumentTouch&&document instanceof DocumentTouch)"),
    ("video", "!!document.createElement('video').canPlayType"),
    ("webgl", "!!window.WebGLRenderingContext"),
    ("websockets", "'WebSocket' in window"),
];

const HELPERS: &str = "var docEl=document.documentElement,s=document.createElement('modernizr').style;\
function prop(p){var u=p.charAt(0).toUpperCase()+p.slice(1),ps=[p,'Webkit'+u,'Moz'+u,'ms'+u,'O'+u];\
for(var i=0;i<ps.length;i++){if(s[ps[i]]!==undefined)return true}return false}";

/// Whether `name` is in the built-in catalog.
#[must_use]
pub fn is_known(name: &str) -> bool {
    CATALOG.iter().any(|(n, _)| *n == name)
}

/// Feature names referenced as `.feature` / `.no-feature` selectors in `css`.
///
/// Only selector text is scanned, so values like `url(icon.svg)` do not
/// count as references.
#[must_use]
pub fn css_references(css: &str) -> BTreeSet<String> {
    let selectors = DECLARATION_BLOCK_RE.replace_all(css, "{}");
    CSS_CLASS_RE
        .captures_iter(&selectors)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|name| is_known(name))
        .map(str::to_string)
        .collect()
}

/// `Modernizr.x` references in `js`, split into known tests and unknown
/// names (API members excluded).
#[must_use]
pub fn js_references(js: &str) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut known = BTreeSet::new();
    let mut unknown = BTreeSet::new();
    for name in JS_REF_RE
        .captures_iter(js)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
    {
        if API_MEMBERS.contains(&name) {
            continue;
        }
        let lower = name.to_ascii_lowercase();
        if is_known(&lower) {
            known.insert(lower);
        } else {
            unknown.insert(name.to_string());
        }
    }
    (known, unknown)
}

/// Everything a detector build found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// Tests included in the script, sorted.
    pub features: Vec<String>,
    /// Names referenced from scripts that the catalog does not know.
    pub unknown: Vec<String>,
    /// The generated script.
    pub script: String,
}

/// Build the detector for the given sources.
///
/// `always` names tests to include whether referenced or not; unknown names
/// there are reported like unknown script references.
#[must_use]
pub fn build<'a>(
    css_sources: impl IntoIterator<Item = &'a str>,
    js_sources: impl IntoIterator<Item = &'a str>,
    always: &[String],
) -> Detection {
    let mut features = BTreeSet::new();
    let mut unknown = BTreeSet::new();
    for css in css_sources {
        features.extend(css_references(css));
    }
    for js in js_sources {
        let (known, missing) = js_references(js);
        features.extend(known);
        unknown.extend(missing);
    }
    for name in always {
        let lower = name.to_ascii_lowercase();
        if is_known(&lower) {
            features.insert(lower);
        } else {
            unknown.insert(name.clone());
        }
    }

    let features: Vec<String> = features.into_iter().collect();
    let script = render(&features);
    Detection {
        features,
        unknown: unknown.into_iter().collect(),
        script,
    }
}

fn render(features: &[String]) -> String {
    let tests: String = features
        .iter()
        .filter_map(|name| {
            CATALOG
                .iter()
                .find(|(n, _)| n == name)
                .map(|(n, expr)| format!("M.{n}=!!({expr});"))
        })
        .collect();
    format!(
        "/*! feature detection: {list} */\n\
         (function(window,document){{var M={{}};{HELPERS}\n{tests}\n\
         var c=[];for(var k in M){{if(M.hasOwnProperty(k))c.push((M[k]?'':'no-')+k)}}\
         docEl.className=docEl.className.replace(/(^|\\s)no-js(\\s|$)/,'$1js$2')+(c.length?' '+c.join(' '):'');\
         window.Modernizr=M}})(window,document);\n",
        list = if features.is_empty() {
            "none".to_string()
        } else {
            features.join(", ")
        },
    )
}
