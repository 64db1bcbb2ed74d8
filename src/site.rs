use std::fmt;

/// Which extraction strategy a site's detail pages need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Labelled lines (`Lançamento: 1999`) matched by regex anywhere in the block.
    Labeled,
    /// Bare value tokens read by index, with anchors for rating and year.
    Positional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Site {
    Gratis,
    Comando,
}

impl Site {
    pub fn name(self) -> &'static str {
        match self {
            Site::Gratis => "gratis",
            Site::Comando => "comando",
        }
    }

    /// Anchors on the listing page that point at detail pages.
    pub fn listing_selector(self) -> &'static str {
        match self {
            Site::Gratis => "#capas_pequenas > div > a",
            Site::Comando => "article > header > h2 > a",
        }
    }

    /// Container that must exist for the listing to be considered well-formed.
    pub fn listing_container(self) -> &'static str {
        match self {
            Site::Gratis => "#capas_pequenas",
            Site::Comando => "article",
        }
    }

    pub fn layout(self) -> Layout {
        match self {
            Site::Gratis => Layout::Labeled,
            Site::Comando => Layout::Positional,
        }
    }

    pub fn info_selector(self) -> &'static str {
        match self {
            Site::Gratis => "#informacoes > p",
            Site::Comando => "div.entry-content.cf > p:nth-child(3)",
        }
    }

    /// Synopsis selectors, tried in order.
    pub fn synopsis_selectors(self) -> &'static [&'static str] {
        match self {
            Site::Gratis => &["#sinopse > p"],
            Site::Comando => &[
                "div.entry-content.cf > p:nth-child(4)",
                "div.entry-content.cf > p:nth-child(5)",
            ],
        }
    }

    pub fn poster_selector(self) -> &'static str {
        match self {
            Site::Gratis => "div.col-12.col-sm-8.col-lg-9.my-1 > img",
            Site::Comando => "div.entry-content.cf img",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
