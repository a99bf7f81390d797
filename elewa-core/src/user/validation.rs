//! 请求校验：字段格式与密码长度，所有错误字段一次性返回

use super::models::{LoginRequest, RegisterRequest};
use crate::error::{AuthError, FieldError, Result};
use crate::store::ProfileUpdate;

const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 254;
const MIN_PASSWORD_LEN: usize = 8;
/// bcrypt 只使用前 72 字节
const MAX_PASSWORD_BYTES: usize = 72;

/// 规范化邮箱：去除首尾空白并转小写
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// 规范化手机号：去除空格与连字符
pub fn normalize_phone(phone: &str) -> String {
    phone
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect()
}

fn check_name(field: &'static str, value: &str, errors: &mut Vec<FieldError>) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.push(FieldError::new(field, "is required"));
    } else if trimmed.chars().count() > MAX_NAME_LEN {
        errors.push(FieldError::new(
            field,
            format!("must be at most {} characters", MAX_NAME_LEN),
        ));
    }
}

fn check_email(value: &str, errors: &mut Vec<FieldError>) {
    let email = normalize_email(value);
    if email.is_empty() {
        errors.push(FieldError::new("email", "is required"));
        return;
    }
    if email.len() > MAX_EMAIL_LEN || !is_email_shaped(&email) {
        errors.push(FieldError::new("email", "must be a valid email address"));
    }
}

fn is_email_shaped(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty())
}

fn check_phone(value: &str, errors: &mut Vec<FieldError>) {
    let phone = normalize_phone(value);
    if phone.is_empty() {
        errors.push(FieldError::new("phone", "is required"));
        return;
    }
    let digits = phone.strip_prefix('+').unwrap_or(&phone);
    let valid = digits.chars().all(|c| c.is_ascii_digit()) && (7..=15).contains(&digits.len());
    if !valid {
        errors.push(FieldError::new(
            "phone",
            "must contain 7 to 15 digits with an optional leading '+'",
        ));
    }
}

fn check_password(value: &str, errors: &mut Vec<FieldError>) {
    if value.is_empty() {
        errors.push(FieldError::new("password", "is required"));
    } else if value.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            "password",
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    } else if value.len() > MAX_PASSWORD_BYTES {
        errors.push(FieldError::new(
            "password",
            format!("must be at most {} bytes", MAX_PASSWORD_BYTES),
        ));
    }
}

fn into_result(errors: Vec<FieldError>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AuthError::Validation(errors))
    }
}

impl RegisterRequest {
    /// 校验所有字段
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        check_name("first_name", &self.first_name, &mut errors);
        check_name("last_name", &self.last_name, &mut errors);
        check_email(&self.email, &mut errors);
        check_phone(&self.phone, &mut errors);
        check_password(&self.password, &mut errors);
        into_result(errors)
    }
}

impl LoginRequest {
    /// 仅检查必填
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.email.trim().is_empty() {
            errors.push(FieldError::new("email", "is required"));
        }
        if self.password.is_empty() {
            errors.push(FieldError::new("password", "is required"));
        }
        into_result(errors)
    }
}

impl ProfileUpdate {
    /// 校验合并后的资料
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        check_name("first_name", &self.first_name, &mut errors);
        check_name("last_name", &self.last_name, &mut errors);
        check_phone(&self.phone, &mut errors);
        into_result(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RegisterRequest {
        RegisterRequest {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "Ada@Example.com".into(),
            phone: "+254 700-000-001".into(),
            password: "analytical-engine".into(),
        }
    }

    fn fields(err: AuthError) -> Vec<&'static str> {
        match err {
            AuthError::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn valid_request_passes() {
        request().validate().unwrap();
    }

    #[test]
    fn reports_every_offending_field() {
        let req = RegisterRequest {
            first_name: "  ".into(),
            last_name: String::new(),
            email: "not-an-email".into(),
            phone: "12ab".into(),
            password: "short".into(),
        };
        assert_eq!(
            fields(req.validate().unwrap_err()),
            vec!["first_name", "last_name", "email", "phone", "password"]
        );
    }

    #[test]
    fn email_shapes() {
        for bad in ["a@b", "@b.co", "a@@b.co", "a b@c.co", "a@.co", "a@b."] {
            let mut req = request();
            req.email = bad.into();
            assert_eq!(fields(req.validate().unwrap_err()), vec!["email"], "{bad}");
        }
    }

    #[test]
    fn password_longer_than_bcrypt_limit_is_rejected() {
        let mut req = request();
        req.password = "x".repeat(73);
        assert_eq!(fields(req.validate().unwrap_err()), vec!["password"]);
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
        assert_eq!(normalize_phone("+254 700-000-001"), "+254700000001");
    }

    #[test]
    fn login_requires_both_fields() {
        let req = LoginRequest {
            email: " ".into(),
            password: String::new(),
        };
        assert_eq!(fields(req.validate().unwrap_err()), vec!["email", "password"]);
    }
}
