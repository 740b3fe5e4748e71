//! Brand profiles and prompt construction for the social content generators
//!
//! Everything here is pure; randomness is injected so prompts are reproducible
//! in tests.

use crate::AccountId;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Probability of mentioning an offer rather than only the website
pub const OFFER_PROBABILITY: f64 = 0.7;

pub const MIN_POSTS_PER_WEEK: u32 = 1;
pub const MAX_POSTS_PER_WEEK: u32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Friendly,
    Professional,
    Casual,
    Expert,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Friendly => "friendly",
            Tone::Professional => "professional",
            Tone::Casual => "casual",
            Tone::Expert => "expert",
        }
    }
}

/// Per-account voice settings used by every generator
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BrandProfile {
    pub account_id: Option<AccountId>,
    pub brand_name: Option<String>,
    pub about_brand: Option<String>,
    pub tone: Option<Tone>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub things_to_avoid: Option<String>,
    pub website: Option<String>,
    #[serde(default)]
    pub pinned_offers: Vec<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// System-prompt fragment describing the account's voice and promotion rules.
pub fn build_brand_prompt<R: Rng + ?Sized>(
    profile: &BrandProfile,
    include_promo: bool,
    rng: &mut R,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    match non_empty(&profile.about_brand) {
        Some(about) => parts.push(format!(
            "You are a content creator. Your background: {}",
            about
        )),
        None => parts.push("You are a content creator sharing your expertise.".to_string()),
    }

    if let Some(tone) = profile.tone {
        parts.push(format!("\nWriting style: {}, conversational", tone.as_str()));
    }
    if !profile.topics.is_empty() {
        parts.push(format!("Topics you cover: {}", profile.topics.join(", ")));
    }
    if let Some(avoid) = non_empty(&profile.things_to_avoid) {
        parts.push(format!("Avoid: {}", avoid));
    }

    parts.push(
        "\nIMPORTANT: Write in the first person as yourself, not as a company. Never open \
         with your business name; share knowledge and experience naturally."
            .to_string(),
    );

    if let Some(brand) = non_empty(&profile.brand_name) {
        parts.push(format!(
            "\nYour business is called \"{}\". Mention it only where it fits naturally, \
             never as an introduction.",
            brand
        ));
    }

    if include_promo {
        let offers: Vec<&str> = profile
            .pinned_offers
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .collect();
        let website = non_empty(&profile.website);

        if !offers.is_empty() || website.is_some() {
            let use_offer =
                !offers.is_empty() && (website.is_none() || rng.gen_bool(OFFER_PROBABILITY));
            if use_offer {
                if let Some(offer) = offers.choose(rng) {
                    parts.push(format!(
                        "\nWhen a post is promotional, you can mention: \"{}\"",
                        offer
                    ));
                }
            }
            if let Some(site) = website {
                parts.push(format!("\nYou can also invite readers to visit {}", site));
            }
            parts.push(
                "\nIMPORTANT: Add a call to action only where it fits. Not every post needs \
                 one; keep it short and never salesy."
                    .to_string(),
            );
        }
    } else {
        parts.push(
            "\nCRITICAL: No promotional content at all. No offers, website mentions or calls \
             to action; pure value only."
                .to_string(),
        );
    }

    parts.join("\n")
}

/// Weekly content focus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Goal {
    Clients,
    Audience,
    Expertise,
}

impl Goal {
    pub fn label(&self) -> &'static str {
        match self {
            Goal::Clients => "Get Clients",
            Goal::Audience => "Grow Audience",
            Goal::Expertise => "Build Authority",
        }
    }

    pub fn promo_focus(&self) -> PromoFocus {
        match self {
            Goal::Clients => PromoFocus::Clients,
            Goal::Audience => PromoFocus::Audience,
            Goal::Expertise => PromoFocus::Authority,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromoFocus {
    Clients,
    Audience,
    Authority,
}

impl PromoFocus {
    pub fn ratio(&self) -> f64 {
        match self {
            PromoFocus::Clients => 0.40,
            PromoFocus::Audience => 0.25,
            PromoFocus::Authority => 0.15,
        }
    }
}

/// Which posts of the week carry a call to action, in shuffled order.
pub fn promo_distribution<R: Rng + ?Sized>(
    focus: PromoFocus,
    total_posts: usize,
    rng: &mut R,
) -> Vec<bool> {
    let promo = (total_posts as f64 * focus.ratio()).round() as usize;
    let mut slots: Vec<bool> = (0..total_posts).map(|i| i < promo).collect();
    slots.shuffle(rng);
    slots
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformMode {
    #[default]
    Both,
    X,
    Linkedin,
}

impl PlatformMode {
    fn describe(&self) -> &'static str {
        match self {
            PlatformMode::Both => "X (Twitter) and LinkedIn",
            PlatformMode::X => "X (Twitter)",
            PlatformMode::Linkedin => "LinkedIn",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Linkedin,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Linkedin => "linkedin",
        }
    }
}

fn schedule_label(slot: &str) -> &str {
    match slot {
        "morning" => "Morning (7-10 AM)",
        "afternoon" => "Afternoon (12-3 PM)",
        "evening" => "Evening (6-9 PM)",
        other => other,
    }
}

/// Input to the weekly growth plan generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub user_name: String,
    pub industry: Option<String>,
    pub goal: Goal,
    #[serde(default)]
    pub topics: Vec<String>,
    pub custom_focus: Option<String>,
    #[serde(default)]
    pub platform_mode: PlatformMode,
    pub posts_per_week: u32,
    #[serde(default)]
    pub schedule: Vec<String>,
    #[serde(default = "default_true")]
    pub include_promo: bool,
}

fn default_true() -> bool {
    true
}

pub const PLAN_SYSTEM_PROMPT: &str = "You are a social media growth strategist for freelancers \
and creators. Produce personalized, actionable weekly plans and always answer with valid JSON. \
Post content must be publishable as-is, with no labels such as \"Hook:\" or \"CTA:\".";

impl PlanRequest {
    pub fn posts_per_week_in_range(&self) -> bool {
        (MIN_POSTS_PER_WEEK..=MAX_POSTS_PER_WEEK).contains(&self.posts_per_week)
    }

    /// User prompt for the plan, given the brand fragment and the promo slots.
    pub fn prompt(&self, brand_prompt: &str, promo_slots: &[bool]) -> String {
        let industry = non_empty(&self.industry);
        let promo_count = promo_slots.iter().filter(|p| **p).count();
        let value_count = self.posts_per_week as usize - promo_count.min(self.posts_per_week as usize);
        let goal = self.goal.label();

        let mut out = String::new();
        let _ = writeln!(
            out,
            "Help {}, a freelancer or creator in the {} industry, {} this week.\n",
            self.user_name,
            industry.unwrap_or("freelancing"),
            goal.to_lowercase()
        );
        let _ = writeln!(out, "{}\n", brand_prompt);
        if let Some(industry) = industry {
            let _ = writeln!(out, "Industry/niche: {}", industry);
        }
        let topics = if self.topics.is_empty() {
            "general freelancing".to_string()
        } else {
            self.topics.join(", ")
        };
        let _ = writeln!(out, "Focus topics: {}", topics);
        if let Some(custom) = non_empty(&self.custom_focus) {
            let _ = writeln!(out, "Custom focus: {}", custom);
        }
        let _ = writeln!(out, "Platforms: {}", self.platform_mode.describe());
        let _ = writeln!(out, "Posts per week: {}", self.posts_per_week);
        let times: Vec<&str> = self.schedule.iter().map(|s| schedule_label(s)).collect();
        let _ = writeln!(out, "Preferred posting times: {}\n", times.join(", "));

        if self.include_promo {
            let _ = writeln!(
                out,
                "Content mix for \"{}\":\n- {} pure value posts with no offer or website\n- {} posts ending with a short, natural call to action\n",
                goal, value_count, promo_count
            );
        } else {
            let _ = writeln!(
                out,
                "CRITICAL: all {} posts are pure value content with no promotion of any kind.\n",
                self.posts_per_week
            );
        }

        let _ = writeln!(
            out,
            "Produce a posting schedule (days like Tue, Thu, Sat with times like \"10 AM\"), \
             {} distinct post ideas suited to each platform, a one-word category per post, \
             three engagement actions and a short strategy summary.",
            self.posts_per_week
        );
        out.push_str(
            "\nRespond with a JSON object shaped as:\n\
             {\"greeting\": string, \"postingSchedule\": {\"description\": string, \"times\": string, \"insight\": string}, \
             \"posts\": [{\"num\": string, \"date\": string, \"platform\": \"twitter\"|\"linkedin\", \"content\": string, \"category\": string}], \
             \"engagementActions\": [string], \
             \"summary\": {\"overview\": string, \"expectedReach\": string, \"contentFocus\": string}}",
        );
        out
    }
}

/// Input to the ad-hoc post generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostsRequest {
    pub prompt: String,
    pub platform: Platform,
    pub industry: Option<String>,
    #[serde(default)]
    pub include_promo: bool,
}

impl PostsRequest {
    pub fn system_prompt(&self, brand_prompt: &str) -> String {
        let base = match self.platform {
            Platform::Twitter => {
                "You write posts for X (Twitter): concise, punchy, under 280 characters, \
                 emojis used sparingly. No hashtags and no labels; write only the post."
            }
            Platform::Linkedin => {
                "You write posts for LinkedIn: professional, story-driven and conversational, \
                 inviting discussion. No hashtags and no labels; write only the post."
            }
        };
        format!("{}\n\n{}", base, brand_prompt)
    }

    pub fn user_prompt(&self) -> String {
        let mut out = format!(
            "Write 3 distinct social media posts about: \"{}\"\n\n",
            self.prompt.trim()
        );
        if let Some(industry) = non_empty(&self.industry) {
            let _ = writeln!(out, "The author works in the {} industry.\n", industry);
        }
        if self.include_promo {
            out.push_str(
                "One post should end with a brief, natural call to action (an offer or the \
                 website); the others are pure value.\n\n",
            );
        } else {
            out.push_str("CRITICAL: pure value content only, no promotion of any kind.\n\n");
        }
        let _ = write!(
            out,
            "Respond with a JSON object shaped as {{\"posts\": [{{\"content\": string, \
             \"category\": string, \"platform\": \"{}\"}}]}}",
            self.platform.as_str()
        );
        out
    }
}
