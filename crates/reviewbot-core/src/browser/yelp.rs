use async_trait::async_trait;
use tracing::info;

use super::{
    BrowserError, Driver, ENTER_KEY, LoginFlow, Locator, ReviewForm, Waits,
    select_rating_control, tolerate_intercepted_click,
};
use crate::config::LoginCredentials;
use crate::model::Review;

pub const LOGIN_BUTTON: Locator = Locator::XPath(
    "/html/body/yelp-react-root/div[1]/div[2]/header/div/div[1]/div[3]/nav/div/div[2]/div/span[1]/a",
);
pub const EMAIL_FIELD: Locator = Locator::XPath(
    "/html/body/div[2]/div[2]/div/div/div/div/div[2]/div/div/div/div[2]/form/div[1]/div/div/div/input",
);
pub const PASSWORD_FIELD: Locator = Locator::XPath(
    "/html/body/div[2]/div[2]/div/div/div/div/div[2]/div/div/div/div[2]/form/div[2]/div/div/div/input",
);
pub const WRITE_REVIEW_LINK: Locator = Locator::LinkText("Write a review");
pub const REVIEW_TEXT: Locator = Locator::XPath(
    "/html/body/yelp-react-root/div[1]/div[3]/div/div/div[2]/div/div[1]/div[3]/div/div/div/div/textarea",
);
pub const RATING_CONTROLS: Locator = Locator::XPath(
    "/html/body/yelp-react-root/div[1]/div[3]/div/div/div[2]/div/div[1]/div[2]/div/div/div/div/div/div/input",
);

/// Page structure of the review site as of the current layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct YelpLayout;

#[async_trait]
impl LoginFlow for YelpLayout {
    async fn authenticate(
        &self,
        driver: &mut dyn Driver,
        waits: &Waits,
        login: &LoginCredentials,
    ) -> Result<(), BrowserError> {
        let button = waits.long(driver, &LOGIN_BUTTON).await?;
        tolerate_intercepted_click(driver.click(&button).await)?;

        let email = waits.long(driver, &EMAIL_FIELD).await?;
        driver.send_keys(&email, &login.email).await?;
        driver.send_keys(&email, ENTER_KEY).await?;

        let password = waits.long(driver, &PASSWORD_FIELD).await?;
        driver.send_keys(&password, &login.password).await?;
        driver.send_keys(&password, ENTER_KEY).await?;
        info!(email = %login.email, "Submitted login");
        Ok(())
    }
}

#[async_trait]
impl ReviewForm for YelpLayout {
    async fn open(&self, driver: &mut dyn Driver, waits: &Waits) -> Result<(), BrowserError> {
        let link = waits.short(driver, &WRITE_REVIEW_LINK).await?;
        driver.click(&link).await?;
        Ok(())
    }

    async fn fill(
        &self,
        driver: &mut dyn Driver,
        waits: &Waits,
        review: &Review,
    ) -> Result<(), BrowserError> {
        let field = waits.long(driver, &REVIEW_TEXT).await?;
        driver.send_keys(&field, &review.text).await?;

        let controls = waits.all_long(driver, &RATING_CONTROLS).await?;
        let control = select_rating_control(&controls, review.rating)?;
        driver.click(control).await?;
        Ok(())
    }
}
