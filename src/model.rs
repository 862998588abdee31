use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Title {
    Mr,
    Ms,
}

impl Title {
    pub fn form_value(self) -> &'static str {
        match self {
            Title::Mr => "MR",
            Title::Ms => "MS",
        }
    }
}

/// Synthetic identity submitted on the login form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub last_name: String,
    pub first_name: String,
    pub patronymic: Option<String>,
    pub phone_number: String,
    pub email: String,
    pub birth_date: NaiveDate,
    pub title: Title,
}

const FIRST_NAMES: [(&str, Title); 10] = [
    ("Ivan", Title::Mr),
    ("Petr", Title::Mr),
    ("Sergey", Title::Mr),
    ("Alexey", Title::Mr),
    ("Dmitry", Title::Mr),
    ("Anna", Title::Ms),
    ("Olga", Title::Ms),
    ("Maria", Title::Ms),
    ("Elena", Title::Ms),
    ("Tatiana", Title::Ms),
];

// Masculine forms; feminine ones get an extra "a".
const LAST_NAMES: [&str; 8] = [
    "Ivanov", "Petrov", "Smirnov", "Kuznetsov", "Popov", "Sokolov", "Lebedev", "Morozov",
];

const MAIL_DOMAINS: [&str; 3] = ["gmail.com", "mail.ru", "yandex.ru"];

impl UserInfo {
    /// A fresh identity, so the site never sees the same visitor twice.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();

        let (first_name, title) = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
        let stem = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())];
        let last_name = match title {
            Title::Mr => stem.to_string(),
            Title::Ms => format!("{stem}a"),
        };

        let phone_number = format!("+7917{:07}", rng.gen_range(0..10_000_000u32));
        let email = format!(
            "{}.{}{}@{}",
            first_name.to_lowercase(),
            last_name.to_lowercase(),
            rng.gen_range(10..1000u32),
            MAIL_DOMAINS[rng.gen_range(0..MAIL_DOMAINS.len())]
        );
        let birth_date = NaiveDate::from_ymd_opt(
            rng.gen_range(1970..2000),
            rng.gen_range(1..=12),
            rng.gen_range(1..=28),
        )
        .unwrap_or_default();

        UserInfo {
            last_name,
            first_name: first_name.to_string(),
            patronymic: None,
            phone_number,
            email,
            birth_date,
            title,
        }
    }

    pub fn birth_day_field(&self) -> String {
        format!("{:02}", self.birth_date.day())
    }

    pub fn birth_month_field(&self) -> String {
        format!("{:02}", self.birth_date.month())
    }

    pub fn birth_year_field(&self) -> String {
        self.birth_date.year().to_string()
    }
}

/// One logged-in browsing session on a consulate site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    pub base_url: String,
    pub user: UserInfo,
}

impl SessionInfo {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Waitlist entry issued by the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub order_number: String,
    pub code: String,
}

/// Raw captcha bytes, kept around so failures can be inspected later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

impl CaptchaImage {
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        CaptchaImage {
            bytes,
            mime_type: "image/jpeg",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self.mime_type {
            "image/png" => "png",
            "image/gif" => "gif",
            _ => "jpeg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowVariant {
    /// login -> order page -> calendar
    Direct,
    /// login -> order page -> order number -> order status lookup -> calendar
    EmailConfirmation,
}

/// How the order type is chosen once logged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRoute {
    Queue { consulate_type: &'static str },
    PassportTenYears { consulate_type: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Website {
    pub name: &'static str,
    pub base_url: &'static str,
    pub timezone: Tz,
    pub variant: WorkflowVariant,
    pub order_route: OrderRoute,
}

impl Website {
    pub const HAGUE: Website = Website {
        name: "hague",
        base_url: "https://hague.kdmid.ru",
        timezone: chrono_tz::Europe::Amsterdam,
        variant: WorkflowVariant::Direct,
        order_route: OrderRoute::Queue {
            consulate_type: "BIOPASSPORT",
        },
    };

    pub const BELGIUM: Website = Website {
        name: "belgium",
        base_url: "https://belgium.kdmid.ru",
        timezone: chrono_tz::Europe::Brussels,
        variant: WorkflowVariant::EmailConfirmation,
        order_route: OrderRoute::Queue {
            consulate_type: "BIOPASSPORT",
        },
    };

    pub const ALL: [Website; 2] = [Website::HAGUE, Website::BELGIUM];

    pub fn by_name(name: &str) -> Option<Website> {
        Website::ALL
            .into_iter()
            .find(|website| website.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Night at the consulate is 23:00..=07:59 local time.
    pub fn is_night_time(&self, now: DateTime<Utc>) -> bool {
        let hour = now.with_timezone(&self.timezone).hour();
        hour >= 23 || hour <= 7
    }
}
