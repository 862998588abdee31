use crate::{
    error::{SessionError, SessionResult},
    model::{Order, UserInfo},
    page_state::PageState,
};

/// Where a form field takes its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    Literal(&'static str),
    ViewState,
    EventValidation,
    PreviousPage,
    EventTarget,
    EventArgument,
    LastName,
    FirstName,
    Patronymic,
    Phone,
    Email,
    BirthDay,
    BirthMonth,
    BirthYear,
    Title,
    CaptchaCode,
    OrderNumber,
    OrderCode,
    Choice,
}

/// Ordered field layout of one postback step.
#[derive(Debug)]
pub struct FormTemplate {
    pub name: &'static str,
    pub fields: &'static [(&'static str, FieldSource)],
}

pub const LOGIN: FormTemplate = FormTemplate {
    name: "login",
    fields: &[
        ("__EVENTTARGET", FieldSource::Literal("")),
        ("__EVENTARGUMENT", FieldSource::Literal("")),
        ("__VIEWSTATE", FieldSource::ViewState),
        ("__EVENTVALIDATION", FieldSource::EventValidation),
        ("ctl00$MainContent$txtFam", FieldSource::LastName),
        ("ctl00$MainContent$txtIm", FieldSource::FirstName),
        ("ctl00$MainContent$txtOt", FieldSource::Patronymic),
        ("ctl00$MainContent$txtTel", FieldSource::Phone),
        ("ctl00$MainContent$txtEmail", FieldSource::Email),
        ("ctl00$MainContent$DDL_Day", FieldSource::BirthDay),
        ("ctl00$MainContent$DDL_Month", FieldSource::BirthMonth),
        ("ctl00$MainContent$TextBox_Year", FieldSource::BirthYear),
        ("ctl00$MainContent$DDL_Mr", FieldSource::Title),
        ("ctl00$MainContent$txtCode", FieldSource::CaptchaCode),
        ("ctl00$MainContent$ButtonA", FieldSource::Literal("Далее")),
    ],
};

pub const QUEUE_REQUEST: FormTemplate = FormTemplate {
    name: "queue request",
    fields: &[
        ("__EVENTTARGET", FieldSource::Literal("")),
        ("__EVENTARGUMENT", FieldSource::Literal("")),
        ("__VIEWSTATE", FieldSource::ViewState),
        ("__PREVIOUSPAGE", FieldSource::PreviousPage),
        ("__EVENTVALIDATION", FieldSource::EventValidation),
        (
            "ctl00$MainContent$ButtonQueue",
            FieldSource::Literal("Записаться на прием"),
        ),
    ],
};

pub const PASSPORT_TYPE: FormTemplate = FormTemplate {
    name: "passport type",
    fields: &[
        ("__EVENTTARGET", FieldSource::Literal("")),
        ("__EVENTARGUMENT", FieldSource::Literal("")),
        ("__VIEWSTATE", FieldSource::ViewState),
        ("__PREVIOUSPAGE", FieldSource::PreviousPage),
        ("__EVENTVALIDATION", FieldSource::EventValidation),
        ("ctl00$MainContent$RList", FieldSource::Choice),
        ("ctl00$MainContent$CheckBoxID", FieldSource::Literal("on")),
        ("ctl00$MainContent$ButtonA", FieldSource::Literal("Далее")),
    ],
};

pub const CALENDAR_DAY: FormTemplate = FormTemplate {
    name: "calendar day",
    fields: &[
        ("__EVENTTARGET", FieldSource::EventTarget),
        ("__EVENTARGUMENT", FieldSource::EventArgument),
        ("__VIEWSTATE", FieldSource::ViewState),
        ("__EVENTVALIDATION", FieldSource::EventValidation),
    ],
};

pub const ORDER_STATUS: FormTemplate = FormTemplate {
    name: "order status",
    fields: &[
        ("__EVENTARGUMENT", FieldSource::Literal("")),
        ("__VIEWSTATE", FieldSource::ViewState),
        ("__EVENTVALIDATION", FieldSource::EventValidation),
        ("ctl00$MainContent$txtID", FieldSource::OrderNumber),
        ("ctl00$MainContent$txtUniqueID", FieldSource::OrderCode),
        ("ctl00$MainContent$txtCode", FieldSource::CaptchaCode),
        ("ctl00$MainContent$ButtonA", FieldSource::Literal("Далее")),
        ("ctl00$MainContent$FeedbackClientID", FieldSource::Literal("0")),
        ("ctl00$MainContent$FeedbackOrderID", FieldSource::Literal("0")),
    ],
};

// ButtonB is an image button, so the site expects click coordinates.
pub const ORDER_STATUS_CONFIRM: FormTemplate = FormTemplate {
    name: "order status confirmation",
    fields: &[
        ("__EVENTTARGET", FieldSource::Literal("")),
        ("__EVENTARGUMENT", FieldSource::Literal("")),
        ("__VIEWSTATE", FieldSource::ViewState),
        ("__EVENTVALIDATION", FieldSource::EventValidation),
        ("ctl00$MainContent$ButtonB.x", FieldSource::Literal("133")),
        ("ctl00$MainContent$ButtonB.y", FieldSource::Literal("30")),
    ],
};

/// Values a template can draw from. Only what a step needs has to be set.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormValues<'a> {
    pub state: Option<&'a PageState>,
    pub user: Option<&'a UserInfo>,
    pub captcha_code: Option<&'a str>,
    pub postback: Option<(&'a str, &'a str)>,
    pub order: Option<&'a Order>,
    pub choice: Option<&'a str>,
}

impl<'a> FormValues<'a> {
    pub fn with_state(state: &'a PageState) -> Self {
        FormValues {
            state: Some(state),
            ..FormValues::default()
        }
    }

    pub fn user(mut self, user: &'a UserInfo) -> Self {
        self.user = Some(user);
        self
    }

    pub fn captcha_code(mut self, code: &'a str) -> Self {
        self.captcha_code = Some(code);
        self
    }

    pub fn postback(mut self, target: &'a str, argument: &'a str) -> Self {
        self.postback = Some((target, argument));
        self
    }

    pub fn order(mut self, order: &'a Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn choice(mut self, choice: &'a str) -> Self {
        self.choice = Some(choice);
        self
    }

    pub fn render(&self, template: &FormTemplate) -> SessionResult<Vec<(&'static str, String)>> {
        template
            .fields
            .iter()
            .map(|(field, source)| {
                self.resolve(*source)
                    .map(|value| (*field, value))
                    .ok_or_else(|| SessionError::FormValueMissing {
                        form: template.name,
                        field: *field,
                    })
            })
            .collect()
    }

    fn resolve(&self, source: FieldSource) -> Option<String> {
        let value = match source {
            FieldSource::Literal(value) => value.to_string(),
            FieldSource::ViewState => self.state?.view_state.clone(),
            FieldSource::EventValidation => self.state?.event_validation.clone(),
            FieldSource::PreviousPage => self.state?.previous_page.clone(),
            FieldSource::EventTarget => self.postback?.0.to_string(),
            FieldSource::EventArgument => self.postback?.1.to_string(),
            FieldSource::LastName => self.user?.last_name.clone(),
            FieldSource::FirstName => self.user?.first_name.clone(),
            FieldSource::Patronymic => self.user?.patronymic.clone().unwrap_or_default(),
            FieldSource::Phone => self.user?.phone_number.clone(),
            FieldSource::Email => self.user?.email.clone(),
            FieldSource::BirthDay => self.user?.birth_day_field(),
            FieldSource::BirthMonth => self.user?.birth_month_field(),
            FieldSource::BirthYear => self.user?.birth_year_field(),
            FieldSource::Title => self.user?.title.form_value().to_string(),
            FieldSource::CaptchaCode => self.captcha_code?.to_string(),
            FieldSource::OrderNumber => self.order?.order_number.clone(),
            FieldSource::OrderCode => self.order?.code.clone(),
            FieldSource::Choice => self.choice?.to_string(),
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::model::Title;

    fn state() -> PageState {
        PageState {
            event_validation: "ev".to_string(),
            view_state: "vs".to_string(),
            previous_page: "pp".to_string(),
        }
    }

    fn user() -> UserInfo {
        UserInfo {
            last_name: "Petrova".to_string(),
            first_name: "Anna".to_string(),
            patronymic: None,
            phone_number: "+79170000001".to_string(),
            email: "anna.petrova42@mail.ru".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 11, 4).unwrap(),
            title: Title::Ms,
        }
    }

    #[test]
    fn renders_login_form_in_template_order() {
        let state = state();
        let user = user();
        let fields = FormValues::with_state(&state)
            .user(&user)
            .captcha_code("022880")
            .render(&LOGIN)
            .unwrap();

        let names: Vec<_> = fields.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            &names[..4],
            &["__EVENTTARGET", "__EVENTARGUMENT", "__VIEWSTATE", "__EVENTVALIDATION"]
        );

        let value = |name: &str| {
            fields
                .iter()
                .find(|(field, _)| *field == name)
                .map(|(_, value)| value.as_str())
                .unwrap()
        };
        assert_eq!(value("__VIEWSTATE"), "vs");
        assert_eq!(value("ctl00$MainContent$txtFam"), "Petrova");
        assert_eq!(value("ctl00$MainContent$txtOt"), "");
        assert_eq!(value("ctl00$MainContent$DDL_Day"), "04");
        assert_eq!(value("ctl00$MainContent$DDL_Month"), "11");
        assert_eq!(value("ctl00$MainContent$DDL_Mr"), "MS");
        assert_eq!(value("ctl00$MainContent$txtCode"), "022880");
        assert_eq!(value("ctl00$MainContent$ButtonA"), "Далее");
    }

    #[test]
    fn missing_value_names_the_field() {
        let state = state();
        let error = FormValues::with_state(&state).render(&LOGIN).unwrap_err();
        assert!(matches!(
            error,
            SessionError::FormValueMissing {
                form: "login",
                field: "ctl00$MainContent$txtFam"
            }
        ));
    }

    #[test]
    fn calendar_day_carries_postback_pair() {
        let state = state();
        let fields = FormValues::with_state(&state)
            .postback("ctl00$MainContent$Calendar", "8893")
            .render(&CALENDAR_DAY)
            .unwrap();
        assert_eq!(
            fields,
            vec![
                ("__EVENTTARGET", "ctl00$MainContent$Calendar".to_string()),
                ("__EVENTARGUMENT", "8893".to_string()),
                ("__VIEWSTATE", "vs".to_string()),
                ("__EVENTVALIDATION", "ev".to_string()),
            ]
        );
    }
}
