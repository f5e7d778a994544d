//! Content-Security-Policy assembly
//!
//! An [`AllowListStrategy`] decides which origins each resource class may load
//! from; [`ContentPolicy`] renders that list together with the per-response
//! nonces into a header value.

use gatehouse_core::{AllowListStrategyKind, ContentPolicySettings};

use crate::markup;
use crate::nonce::Nonces;

const SELF: &str = "'self'";
const UNSAFE_INLINE: &str = "'unsafe-inline'";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    Script,
    Style,
    Image,
    Font,
    Connect,
    Frame,
}

/// Ordered, duplicate-free source lists per resource class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    pub script: Vec<String>,
    pub style: Vec<String>,
    pub img: Vec<String>,
    pub font: Vec<String>,
    pub connect: Vec<String>,
    pub frame: Vec<String>,
}

impl AllowList {
    pub fn from_settings(settings: &ContentPolicySettings) -> Self {
        let mut list = Self::default();
        for (class, sources) in [
            (ResourceClass::Script, &settings.script_sources),
            (ResourceClass::Style, &settings.style_sources),
            (ResourceClass::Image, &settings.img_sources),
            (ResourceClass::Font, &settings.font_sources),
            (ResourceClass::Connect, &settings.connect_sources),
            (ResourceClass::Frame, &settings.frame_sources),
        ] {
            for source in sources {
                list.add(class, source.trim());
            }
        }
        list
    }

    fn sources_mut(&mut self, class: ResourceClass) -> &mut Vec<String> {
        match class {
            ResourceClass::Script => &mut self.script,
            ResourceClass::Style => &mut self.style,
            ResourceClass::Image => &mut self.img,
            ResourceClass::Font => &mut self.font,
            ResourceClass::Connect => &mut self.connect,
            ResourceClass::Frame => &mut self.frame,
        }
    }

    pub fn add(&mut self, class: ResourceClass, source: impl Into<String>) {
        let source = source.into();
        if source.is_empty() {
            return;
        }
        let sources = self.sources_mut(class);
        if !sources.contains(&source) {
            sources.push(source);
        }
    }

    pub fn merge(&mut self, other: &AllowList) {
        for (class, sources) in [
            (ResourceClass::Script, &other.script),
            (ResourceClass::Style, &other.style),
            (ResourceClass::Image, &other.img),
            (ResourceClass::Font, &other.font),
            (ResourceClass::Connect, &other.connect),
            (ResourceClass::Frame, &other.frame),
        ] {
            for source in sources {
                self.add(class, source.as_str());
            }
        }
    }
}

pub trait AllowListStrategy: Send + Sync {
    fn kind(&self) -> AllowListStrategyKind;

    /// Allow-list for one response; `markup` is its HTML body when one was read
    fn allow_list(&self, markup: Option<&str>) -> AllowList;

    /// Whether the strategy needs the HTML body to build its list
    fn reads_markup(&self) -> bool {
        false
    }
}

/// The audited, deployment-wide list
pub struct StaticAllowList {
    list: AllowList,
}

impl StaticAllowList {
    pub fn new(list: AllowList) -> Self {
        Self { list }
    }
}

impl AllowListStrategy for StaticAllowList {
    fn kind(&self) -> AllowListStrategyKind {
        AllowListStrategyKind::Static
    }

    fn allow_list(&self, _markup: Option<&str>) -> AllowList {
        self.list.clone()
    }
}

/// Trusts whatever origins the origin's own markup references.
///
/// A compromised or user-influenced page can widen its own policy this way,
/// so it is only used when explicitly configured.
#[derive(Default)]
pub struct MarkupScanAllowList;

impl MarkupScanAllowList {
    fn self_only() -> AllowList {
        let mut list = AllowList::default();
        for class in [
            ResourceClass::Script,
            ResourceClass::Style,
            ResourceClass::Image,
            ResourceClass::Connect,
        ] {
            list.add(class, SELF);
        }
        list
    }
}

impl AllowListStrategy for MarkupScanAllowList {
    fn kind(&self) -> AllowListStrategyKind {
        AllowListStrategyKind::MarkupScan
    }

    fn allow_list(&self, markup: Option<&str>) -> AllowList {
        let mut list = Self::self_only();
        if let Some(html) = markup {
            list.merge(&markup::scan_origins(html));
        }
        list
    }

    fn reads_markup(&self) -> bool {
        true
    }
}

pub struct HybridAllowList {
    list: AllowList,
}

impl HybridAllowList {
    pub fn new(list: AllowList) -> Self {
        Self { list }
    }
}

impl AllowListStrategy for HybridAllowList {
    fn kind(&self) -> AllowListStrategyKind {
        AllowListStrategyKind::Hybrid
    }

    fn allow_list(&self, markup: Option<&str>) -> AllowList {
        let mut list = self.list.clone();
        if let Some(html) = markup {
            list.merge(&markup::scan_origins(html));
        }
        list
    }

    fn reads_markup(&self) -> bool {
        true
    }
}

pub fn strategy_for(settings: &ContentPolicySettings) -> Box<dyn AllowListStrategy> {
    match settings.strategy {
        AllowListStrategyKind::Static => {
            Box::new(StaticAllowList::new(AllowList::from_settings(settings)))
        }
        AllowListStrategyKind::MarkupScan => Box::new(MarkupScanAllowList),
        AllowListStrategyKind::Hybrid => {
            Box::new(HybridAllowList::new(AllowList::from_settings(settings)))
        }
    }
}

/// One rendered policy
#[derive(Debug, Clone)]
pub struct ContentPolicy<'a> {
    pub allow_list: AllowList,
    pub nonces: Option<&'a Nonces>,
    /// Authorize inline blocks wholesale when no nonces were spliced in
    pub unsafe_inline: bool,
    /// `frame-ancestors` value, kept in line with `X-Frame-Options`
    pub frame_ancestors: &'a str,
    pub inline_style_attributes: bool,
    pub upgrade_insecure_requests: bool,
}

impl ContentPolicy<'_> {
    pub fn render(&self) -> String {
        let script = self.with_nonce(&self.allow_list.script, self.nonces.map(|n| &n.script));
        let style = self.with_nonce(&self.allow_list.style, self.nonces.map(|n| &n.style));

        let mut directives = vec![
            format!("default-src {}", SELF),
            format!("script-src {}", script),
            format!("script-src-elem {}", script),
            format!("worker-src {} blob:", SELF),
            format!("style-src {}", style),
            format!("style-src-elem {}", style),
        ];
        if self.inline_style_attributes {
            directives.push(format!("style-src-attr {}", UNSAFE_INLINE));
        }
        directives.extend([
            format!("img-src {}", source_list(&self.allow_list.img)),
            format!("connect-src {}", source_list(&self.allow_list.connect)),
            format!("frame-src {}", source_list(&self.allow_list.frame)),
            format!("font-src {}", source_list(&self.allow_list.font)),
            "object-src 'none'".to_string(),
            format!("base-uri {}", SELF),
            format!("form-action {}", SELF),
            format!("frame-ancestors {}", self.frame_ancestors),
        ]);
        if self.upgrade_insecure_requests {
            directives.push("upgrade-insecure-requests".to_string());
        }

        directives.join("; ")
    }

    fn with_nonce(&self, sources: &[String], nonce: Option<&String>) -> String {
        match nonce {
            Some(nonce) => {
                let mut values: Vec<String> = sources.to_vec();
                values.push(format!("'nonce-{}'", nonce));
                values.join(" ")
            }
            None if self.unsafe_inline => {
                let mut values: Vec<String> = sources.to_vec();
                values.push(UNSAFE_INLINE.to_string());
                values.join(" ")
            }
            None => source_list(sources),
        }
    }
}

/// Nonces of a rendered policy, read back from its `script-src` and `style-src`
pub fn nonces_in(policy: &str) -> Option<Nonces> {
    let nonce_of = |name: &str| {
        policy.split(';').find_map(|directive| {
            let mut tokens = directive.split_whitespace();
            if tokens.next()? != name {
                return None;
            }
            tokens
                .find_map(|token| token.strip_prefix("'nonce-")?.strip_suffix('\''))
                .map(str::to_string)
        })
    };

    Some(Nonces {
        script: nonce_of("script-src")?,
        style: nonce_of("style-src")?,
    })
}

/// An empty class renders as `'none'` rather than an invalid bare directive
fn source_list(sources: &[String]) -> String {
    if sources.is_empty() {
        "'none'".to_string()
    } else {
        sources.join(" ")
    }
}

/// `frame-ancestors` equivalent of an `X-Frame-Options` value
pub fn frame_ancestors_for(x_frame_options: &str) -> &'static str {
    if x_frame_options.trim().eq_ignore_ascii_case("deny") {
        "'none'"
    } else {
        SELF
    }
}
